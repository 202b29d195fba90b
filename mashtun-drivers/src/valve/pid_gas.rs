//! PID-controlled gas valve
//!
//! A stepper motor turns the knob of a gas burner valve. Angles are fractions
//! of one knob turn: `0.0` is the off detent, [`ValveConfig::max_angle`] is
//! full flame and [`ValveConfig::min_angle`] is the lowest flame that stays
//! lit.
//!
//! Closing drives a few steps past zero so the knob seats in its detent.
//! Opening from closed to a partial flame first runs an ignition sequence:
//! seat, open fully, hold while the igniter catches, drop to minimum.
//!
//! The valve only moves when the reading has drifted by at least the
//! tolerance since the last move, which keeps the motor from hunting.

use embedded_hal::delay::DelayNs;
use mashtun_core::traits::{elapsed_ms, Actuator, ActuatorError, Clock};

use crate::stepper::PositionStepper;

/// PID gains
///
/// The output is a knob angle in turns. Error is in sensor units (°C) and
/// time in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidGains {
    /// Turns per unit of error
    pub kp: f32,
    /// Turns per unit of accumulated error-seconds
    pub ki: f32,
    /// Turns per unit of reading change per second
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.05,
            ki: 0.0005,
            kd: 0.0,
        }
    }
}

/// Gas valve configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValveConfig {
    pub gains: PidGains,
    /// Lowest flame, in turns
    pub min_angle: f32,
    /// Full flame, in turns
    pub max_angle: f32,
    /// Motor steps per knob turn
    pub steps_per_turn: u32,
    /// Steps past zero used to seat the knob when closing
    pub closed_offset_steps: u32,
    /// Time at full flame while the burner lights, in milliseconds
    pub ignition_hold_ms: u32,
}

impl Default for ValveConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            min_angle: 0.1,
            max_angle: 0.5,
            steps_per_turn: 4096, // 28BYJ-48, half-stepped
            closed_offset_steps: 50,
            ignition_hold_ms: 1_000,
        }
    }
}

/// PID gas valve actuator
pub struct PidGasValve<M, D, C> {
    stepper: M,
    delay: D,
    clock: C,
    config: ValveConfig,
    reference: f32,
    tolerance: f32,
    active: bool,
    open: bool,
    /// Reading at the last valve move
    last_input: f32,
    integral: f32,
    angle: f32,
    last_update_ms: u32,
}

impl<M, D, C> PidGasValve<M, D, C>
where
    M: PositionStepper,
    D: DelayNs,
    C: Clock,
{
    /// Create a valve; the knob is assumed closed
    pub fn new(stepper: M, delay: D, clock: C, config: ValveConfig) -> Self {
        let last_update_ms = clock.now_ms();
        Self {
            stepper,
            delay,
            clock,
            config,
            reference: 0.0,
            tolerance: 0.0,
            active: false,
            open: false,
            last_input: 0.0,
            integral: 0.0,
            angle: 0.0,
            last_update_ms,
        }
    }

    /// Current knob angle in turns (negative when seated closed)
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn config(&self) -> &ValveConfig {
        &self.config
    }

    pub fn stepper(&self) -> &M {
        &self.stepper
    }

    /// Shut the gas off
    pub fn close(&mut self) -> Result<(), ActuatorError> {
        if !self.open {
            return Ok(());
        }
        self.to_minimum()?;
        self.set_angle(-1.0)
    }

    fn to_minimum(&mut self) -> Result<(), ActuatorError> {
        if !self.open && !self.active {
            return Ok(());
        }
        self.active = false;
        self.set_angle(self.config.min_angle)
    }

    /// Steer toward the target after a reading
    fn regulate(&mut self, input: f32, now: u32) -> Result<(), ActuatorError> {
        let drift = if input > self.last_input {
            input - self.last_input
        } else {
            self.last_input - input
        };
        if drift < self.tolerance {
            return Ok(());
        }

        let gains = self.config.gains;
        let dt_ms = elapsed_ms(now, self.last_update_ms);
        let dt = dt_ms as f32 / 1000.0;
        let error = self.reference - input;

        self.integral += error * dt;
        let derivative = if dt_ms == 0 {
            0.0
        } else {
            -gains.kd * (input - self.last_input) / dt
        };

        let angle = (derivative + gains.kp * error + gains.ki * self.integral)
            .clamp(self.config.min_angle, self.config.max_angle);
        self.set_angle(angle)?;
        self.last_input = input;
        Ok(())
    }

    /// Move the knob, handling the closed detent and ignition
    ///
    /// Angles at or below zero close the valve.
    fn set_angle(&mut self, angle: f32) -> Result<(), ActuatorError> {
        if !self.open && angle <= 0.0 {
            return Ok(());
        }

        if !self.open {
            self.open = true;
            if angle > 0.0 && angle < self.config.max_angle {
                self.ignite()?;
            }
        }

        let (angle, steps) = if angle >= self.config.max_angle {
            let max = self.config.max_angle;
            (max, self.steps(max))
        } else if angle <= 0.0 {
            self.open = false;
            let offset = self.config.closed_offset_steps as i32;
            (-offset as f32 / self.config.steps_per_turn as f32, -offset)
        } else {
            let angle = angle.max(self.config.min_angle);
            (angle, self.steps(angle))
        };

        self.stepper
            .move_to(steps)
            .map_err(|_| ActuatorError::DriveFailed)?;
        self.angle = angle;
        Ok(())
    }

    /// Seat, open fully, hold for the igniter, drop to minimum
    fn ignite(&mut self) -> Result<(), ActuatorError> {
        #[cfg(feature = "defmt")]
        defmt::info!("gas valve ignition");

        self.set_angle(0.0)?;
        self.set_angle(self.config.max_angle)?;
        self.delay.delay_ms(self.config.ignition_hold_ms);
        self.set_angle(self.config.min_angle)
    }

    fn steps(&self, angle: f32) -> i32 {
        (angle * self.config.steps_per_turn as f32) as i32
    }
}

impl<M, D, C> Actuator for PidGasValve<M, D, C>
where
    M: PositionStepper,
    D: DelayNs,
    C: Clock,
{
    fn set_reference(&mut self, reference: f32, tolerance: f32) {
        self.reference = reference;
        self.tolerance = tolerance.max(0.0);
    }

    fn reference(&self) -> f32 {
        self.reference
    }

    fn tolerance(&self) -> f32 {
        self.tolerance
    }

    fn act(&mut self, input: f32, ignore_input: bool) -> Result<(), ActuatorError> {
        let now = self.clock.now_ms();

        let result = if ignore_input {
            self.active = true;
            self.set_angle(self.config.max_angle)
        } else if !input.is_finite() {
            Err(ActuatorError::InvalidInput)
        } else if input >= self.reference {
            if self.active {
                self.active = false;
                self.set_angle(self.config.min_angle)
            } else {
                Ok(())
            }
        } else {
            self.active = true;
            self.regulate(input, now)
        };

        self.last_update_ms = now;
        result
    }

    fn deactivate(&mut self) {
        if let Err(_e) = self.to_minimum() {
            #[cfg(feature = "defmt")]
            defmt::warn!("gas valve stuck: {}", _e);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn release(&mut self) {
        if let Err(_e) = self.close() {
            #[cfg(feature = "defmt")]
            defmt::warn!("gas valve failed to close: {}", _e);
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use heapless::Vec;

    use super::*;
    use crate::stepper::StepperError;

    #[derive(Default)]
    struct MockStepper {
        position: i32,
        moves: Vec<i32, 32>,
        fail: bool,
    }

    impl PositionStepper for MockStepper {
        fn position(&self) -> i32 {
            self.position
        }

        fn move_to(&mut self, target: i32) -> Result<(), StepperError> {
            if self.fail {
                return Err(StepperError::Pin);
            }
            self.position = target;
            let _ = self.moves.push(target);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDelay {
        total_ms: u32,
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ms += ns / 1_000_000;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += ms;
        }
    }

    struct MockClock {
        now: Cell<u32>,
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> u32 {
            self.now.get()
        }
    }

    fn config() -> ValveConfig {
        ValveConfig {
            gains: PidGains {
                kp: 0.05,
                ki: 0.0,
                kd: 0.0,
            },
            min_angle: 0.1,
            max_angle: 0.5,
            steps_per_turn: 1000,
            closed_offset_steps: 50,
            ignition_hold_ms: 1_000,
        }
    }

    fn valve(clock: &MockClock) -> PidGasValve<MockStepper, MockDelay, &MockClock> {
        let mut valve = PidGasValve::new(
            MockStepper::default(),
            MockDelay::default(),
            clock,
            config(),
        );
        valve.set_reference(65.0, 1.0);
        valve
    }

    #[test]
    fn test_ignition_from_closed() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);

        // 65 - 61 = 4 degrees -> 0.2 turns
        valve.act(61.0, false).unwrap();
        assert!(valve.is_active());
        assert!(valve.is_open());
        assert_eq!(valve.stepper.moves.as_slice(), &[-50, 500, 100, 200]);
        assert_eq!(valve.delay.total_ms, 1_000);
        assert_eq!(valve.angle(), 0.2);
    }

    #[test]
    fn test_full_open_skips_ignition() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);

        valve.act(20.0, false).unwrap();
        assert_eq!(valve.stepper.moves.as_slice(), &[500]);
        assert_eq!(valve.delay.total_ms, 0);
    }

    #[test]
    fn test_manual_override_opens_fully() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);

        valve.act(f32::NAN, true).unwrap();
        assert!(valve.is_active());
        assert_eq!(valve.angle(), 0.5);
    }

    #[test]
    fn test_small_drift_does_not_move() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);

        valve.act(61.0, false).unwrap();
        let moves = valve.stepper.moves.len();
        let angle = valve.angle();

        clock.now.set(2_000);
        valve.act(61.6, false).unwrap();
        assert_eq!(valve.stepper.moves.len(), moves);
        assert_eq!(valve.angle(), angle);

        clock.now.set(4_000);
        valve.act(62.0, false).unwrap();
        assert_eq!(valve.angle(), 0.15);
    }

    #[test]
    fn test_reaching_target_drops_to_minimum() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);

        valve.act(61.0, false).unwrap();
        valve.act(66.0, false).unwrap();
        assert!(!valve.is_active());
        assert!(valve.is_open());
        assert_eq!(valve.angle(), 0.1);

        // Already idle: nothing moves
        let moves = valve.stepper.moves.len();
        valve.act(67.0, false).unwrap();
        assert_eq!(valve.stepper.moves.len(), moves);
    }

    #[test]
    fn test_release_closes_past_zero() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);

        valve.act(20.0, false).unwrap();
        valve.release();
        assert!(!valve.is_open());
        assert!(!valve.is_active());
        assert_eq!(valve.stepper.position, -50);
        assert_eq!(valve.angle(), -0.05);

        // Closing a closed valve does nothing
        let moves = valve.stepper.moves.len();
        valve.release();
        assert_eq!(valve.stepper.moves.len(), moves);
    }

    #[test]
    fn test_deactivate_keeps_flame() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);

        valve.act(20.0, false).unwrap();
        valve.deactivate();
        assert!(valve.is_open());
        assert!(!valve.is_active());
        assert_eq!(valve.angle(), 0.1);
    }

    #[test]
    fn test_integral_and_derivative_terms() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);
        valve.config.gains = PidGains {
            kp: 0.0,
            ki: 0.01,
            kd: 0.1,
        };

        // Zero elapsed time: no integral, no derivative, clamped to minimum
        valve.act(60.0, false).unwrap();
        assert_eq!(valve.angle(), 0.1);

        // Falling reading adds to the output: 0.01 * 7 * 10 + -0.1 * -2 / 10 = 0.72
        clock.now.set(10_000);
        valve.act(58.0, false).unwrap();
        assert_eq!(valve.angle(), 0.5);

        // Rising reading subtracts: 0.01 * (70 + 2 * 1) + -0.1 * 5 / 1 = 0.22
        clock.now.set(11_000);
        valve.act(63.0, false).unwrap();
        let off = valve.angle() - 0.22;
        assert!(off > -1e-4 && off < 1e-4);
    }

    #[test]
    fn test_invalid_input_and_drive_failure() {
        let clock = MockClock { now: Cell::new(0) };
        let mut valve = valve(&clock);
        assert_eq!(valve.act(f32::NAN, false), Err(ActuatorError::InvalidInput));

        valve.stepper.fail = true;
        assert_eq!(valve.act(20.0, false), Err(ActuatorError::DriveFailed));
    }
}
