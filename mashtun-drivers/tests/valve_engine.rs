//! Control engine driving a real PID gas valve.

use std::cell::Cell;

use embedded_hal::delay::DelayNs;
use mashtun_core::config::{ControllerConfig, PinMap};
use mashtun_core::registry::DeviceRegistry;
use mashtun_core::state::Status;
use mashtun_core::traits::{Actuator, Clock, MemEeprom, Sensor, SensorError};
use mashtun_core::{Controller, TickEvent};
use mashtun_drivers::stepper::{PositionStepper, StepperError};
use mashtun_drivers::valve::{PidGains, PidGasValve, ValveConfig};
use proptest::prelude::*;

const SENSOR_PIN: u8 = 26;
const VALVE_PIN: u8 = 6;
const MINUTE: u32 = 60_000;

struct ProbeSensor {
    reading: f32,
}

impl Sensor for ProbeSensor {
    fn read(&mut self) -> Result<f32, SensorError> {
        Ok(self.reading)
    }
}

#[derive(Default)]
struct CountingStepper {
    position: i32,
    moves: usize,
}

impl PositionStepper for CountingStepper {
    fn position(&self) -> i32 {
        self.position
    }

    fn move_to(&mut self, target: i32) -> Result<(), StepperError> {
        self.position = target;
        self.moves += 1;
        Ok(())
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

struct TestClock {
    now: Cell<u32>,
}

impl TestClock {
    fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

type Valve<'a> = PidGasValve<CountingStepper, NoDelay, &'a TestClock>;

fn valve_config() -> ValveConfig {
    ValveConfig {
        gains: PidGains {
            kp: 0.05,
            ki: 0.0,
            kd: 0.0,
        },
        steps_per_turn: 1000,
        ..ValveConfig::default()
    }
}

fn valve(clock: &TestClock) -> Valve<'_> {
    PidGasValve::new(CountingStepper::default(), NoDelay, clock, valve_config())
}

fn controller(
    clock: &TestClock,
) -> Controller<ProbeSensor, Valve<'_>, &TestClock, MemEeprom<512>> {
    let registry = DeviceRegistry::new(
        PinMap::default(),
        SENSOR_PIN,
        ProbeSensor { reading: 20.0 },
        VALVE_PIN,
        valve(clock),
    )
    .unwrap();
    Controller::new(ControllerConfig::default(), registry, clock, MemEeprom::new()).unwrap()
}

#[test]
fn single_stage_brew_with_gas_valve() {
    let clock = TestClock { now: Cell::new(5) };
    let mut controller = controller(&clock);
    controller.set_stage(0, 10.0, 65.0, 1.0).unwrap();
    controller.start(false).unwrap();

    controller.registry_mut().sensor_mut(SENSOR_PIN).unwrap().reading = 60.0;
    controller.run().unwrap();
    assert!(controller.is_actuator_on(VALVE_PIN));
    let valve = controller.registry().actuator(VALVE_PIN).unwrap();
    assert!(valve.is_open());
    assert_eq!(valve.reference(), 65.0);

    clock.advance(MINUTE);
    controller.registry_mut().sensor_mut(SENSOR_PIN).unwrap().reading = 66.0;
    controller.run().unwrap();
    assert!(!controller.is_actuator_on(VALVE_PIN));
    // Target reached: lowest flame, still lit
    let valve = controller.registry().actuator(VALVE_PIN).unwrap();
    assert!(valve.is_open());
    assert_eq!(valve.angle(), valve.config().min_angle);

    clock.advance(9 * MINUTE);
    let outcome = controller.run().unwrap();
    assert_eq!(outcome.event, Some(TickEvent::RecipeFinished));
    assert_eq!(controller.status(), Status::Idle);

    // End of brew shuts the gas off
    let valve = controller.registry().actuator(VALVE_PIN).unwrap();
    assert!(!valve.is_open());
    assert!(valve.angle() < 0.0);
}

#[test]
fn stop_leaves_valve_at_minimum() {
    let clock = TestClock { now: Cell::new(0) };
    let mut controller = controller(&clock);
    controller.set_stage(0, 10.0, 65.0, 1.0).unwrap();
    controller.start(false).unwrap();

    controller.registry_mut().sensor_mut(SENSOR_PIN).unwrap().reading = 50.0;
    controller.run().unwrap();
    controller.stop().unwrap();

    let valve = controller.registry().actuator(VALVE_PIN).unwrap();
    assert!(!valve.is_active());
    assert!(valve.is_open());

    // Manual override is allowed while stopped
    controller.activate(VALVE_PIN).unwrap();
    let valve = controller.registry().actuator(VALVE_PIN).unwrap();
    assert_eq!(valve.angle(), valve.config().max_angle);

    controller.reset().unwrap();
    assert!(!controller.registry().actuator(VALVE_PIN).unwrap().is_open());
}

proptest! {
    /// Readings closer than the tolerance to the last accepted one never
    /// move the knob.
    #[test]
    fn sub_tolerance_drift_holds_angle(
        first in 20.0f32..64.0,
        drift in -0.99f32..0.99,
        tolerance in 1.0f32..5.0,
    ) {
        let clock = TestClock { now: Cell::new(0) };
        let mut valve = valve(&clock);
        valve.set_reference(65.0, tolerance);

        valve.act(first, false).unwrap();
        let angle = valve.angle();
        let moves = valve.stepper().moves;

        clock.advance(1_000);
        let second = (first + drift).min(64.9);
        valve.act(second, false).unwrap();

        prop_assert_eq!(valve.angle(), angle);
        prop_assert_eq!(valve.stepper().moves, moves);
    }
}
