//! Board devices
//!
//! Binds embassy-rp peripherals to the driver traits and assembles the
//! device registry described by brew.toml.

use core::cell::RefCell;

use embassy_rp::adc::{self, Adc, Blocking};
use embassy_rp::gpio::{AnyPin, Level, Output};
use embassy_rp::Peri;
use embassy_time::{Delay, Instant};

use mashtun_core::config::PinMap;
use mashtun_core::registry::DeviceRegistry;
use mashtun_core::traits::{Actuator, ActuatorError, Clock};
use mashtun_core::{Controller, Error};
use mashtun_drivers::relay::{RelayActuator, RelayConfig};
use mashtun_drivers::sensor::{AdcError, AdcReader, NtcSensor};
use mashtun_drivers::stepper::HalfStepDriver;
use mashtun_drivers::valve::PidGasValve;

use crate::config::{
    EXTRA_SENSORS, MAIN_SENSOR_PIN, MAIN_SENSOR_PULLUP_OHMS, RELAYS, STEPPER_CONFIG, VALVE_CONFIG,
    VALVE_PIN,
};
use crate::flash::RegionImage;

/// Pins handed over by `take_board_pins!`
pub struct BoardPins {
    pub main_sensor: adc::Channel<'static>,
    /// Energising order
    pub valve_coils: [Peri<'static, AnyPin>; 4],
    pub extra_sensors: [adc::Channel<'static>; EXTRA_SENSORS.len()],
    pub relays: [Peri<'static, AnyPin>; RELAYS.len()],
}

/// Millisecond clock on the embassy time driver
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        // Truncation wraps after ~49 days, callers use wrapping arithmetic
        Instant::now().as_millis() as u32
    }
}

/// ADC shared by every analog sensor
pub type SharedAdc = RefCell<Adc<'static, Blocking>>;

/// One ADC input on the shared converter
pub struct AdcInput {
    adc: &'static SharedAdc,
    channel: adc::Channel<'static>,
}

impl AdcReader for AdcInput {
    fn read(&mut self) -> Result<u16, AdcError> {
        let mut adc = self.adc.try_borrow_mut().map_err(|_| AdcError)?;
        adc.blocking_read(&mut self.channel).map_err(|_| AdcError)
    }
}

pub type BoardSensor = NtcSensor<AdcInput>;

pub type BoardValve = PidGasValve<HalfStepDriver<Output<'static>, Delay>, Delay, EmbassyClock>;

/// Actuators fitted to the board
pub enum BoardActuator {
    Valve(BoardValve),
    Relay(RelayActuator<Output<'static>>),
}

impl Actuator for BoardActuator {
    fn set_reference(&mut self, reference: f32, tolerance: f32) {
        match self {
            Self::Valve(valve) => valve.set_reference(reference, tolerance),
            Self::Relay(relay) => relay.set_reference(reference, tolerance),
        }
    }

    fn reference(&self) -> f32 {
        match self {
            Self::Valve(valve) => valve.reference(),
            Self::Relay(relay) => relay.reference(),
        }
    }

    fn tolerance(&self) -> f32 {
        match self {
            Self::Valve(valve) => valve.tolerance(),
            Self::Relay(relay) => relay.tolerance(),
        }
    }

    fn act(&mut self, input: f32, ignore_input: bool) -> Result<(), ActuatorError> {
        match self {
            Self::Valve(valve) => valve.act(input, ignore_input),
            Self::Relay(relay) => relay.act(input, ignore_input),
        }
    }

    fn deactivate(&mut self) {
        match self {
            Self::Valve(valve) => valve.deactivate(),
            Self::Relay(relay) => relay.deactivate(),
        }
    }

    fn is_active(&self) -> bool {
        match self {
            Self::Valve(valve) => valve.is_active(),
            Self::Relay(relay) => relay.is_active(),
        }
    }

    fn release(&mut self) {
        match self {
            Self::Valve(valve) => valve.release(),
            Self::Relay(relay) => relay.release(),
        }
    }
}

pub type BoardRegistry = DeviceRegistry<BoardSensor, BoardActuator>;

pub type BoardController = Controller<BoardSensor, BoardActuator, EmbassyClock, RegionImage>;

/// Build the registry: main sensor, gas valve, then the extra devices
pub fn build_registry(pins: BoardPins, adc: &'static SharedAdc) -> Result<BoardRegistry, Error> {
    let main_sensor = NtcSensor::new(
        AdcInput {
            adc,
            channel: pins.main_sensor,
        },
        MAIN_SENSOR_PULLUP_OHMS,
    );

    let coils = pins.valve_coils.map(|pin| Output::new(pin, Level::Low));
    let stepper =
        HalfStepDriver::new(coils, Delay, STEPPER_CONFIG).map_err(|_| Error::InvalidState)?;
    let valve = PidGasValve::new(stepper, Delay, EmbassyClock, VALVE_CONFIG);

    let mut registry = DeviceRegistry::new(
        PinMap::default(),
        MAIN_SENSOR_PIN,
        main_sensor,
        VALVE_PIN,
        BoardActuator::Valve(valve),
    )?;

    for (&(pin, pullup_ohms), channel) in EXTRA_SENSORS.iter().zip(pins.extra_sensors) {
        let sensor = NtcSensor::new(AdcInput { adc, channel }, pullup_ohms);
        registry.add_sensor(pin, sensor)?;
    }

    for (&(pin, active_low), output) in RELAYS.iter().zip(pins.relays) {
        // Start at the inactive level
        let level = if active_low { Level::High } else { Level::Low };
        let relay = RelayActuator::new(Output::new(output, level), RelayConfig { active_low })?;
        registry.add_actuator(pin, BoardActuator::Relay(relay))?;
    }

    Ok(registry)
}
