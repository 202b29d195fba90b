//! Half-step driver for 4-coil unipolar steppers
//!
//! Drives a 28BYJ-48 style motor through a ULN2003 darlington array: four
//! GPIO outputs, one per coil, energised in the 8-phase half-step sequence.
//!
//! The coils must be passed in energising order. On the common ULN2003
//! boards that is IN1, IN3, IN2, IN4.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use super::{PositionStepper, StepperError};

/// Coil pattern of each half-step phase (A, AB, B, BC, C, CD, D, DA)
const HALF_STEP_SEQUENCE: [[bool; 4]; 8] = [
    [true, false, false, false],
    [true, true, false, false],
    [false, true, false, false],
    [false, true, true, false],
    [false, false, true, false],
    [false, false, true, true],
    [false, false, false, true],
    [true, false, false, true],
];

/// Half-step driver configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HalfStepConfig {
    /// Pause after each step in microseconds (sets the speed)
    pub step_delay_us: u32,
    /// Switch every coil off after a move
    ///
    /// The motor loses holding torque but does not heat up while parked.
    pub release_when_idle: bool,
}

impl Default for HalfStepConfig {
    fn default() -> Self {
        Self {
            step_delay_us: 1_200, // ~830 half-steps/s, within 28BYJ-48 pull-in
            release_when_idle: true,
        }
    }
}

/// Half-step stepper driver
pub struct HalfStepDriver<P, D> {
    coils: [P; 4],
    delay: D,
    config: HalfStepConfig,
    position: i32,
    /// Index into [`HALF_STEP_SEQUENCE`]
    phase: usize,
}

impl<P: OutputPin, D: DelayNs> HalfStepDriver<P, D> {
    /// Create a new driver with all coils off at position 0
    pub fn new(coils: [P; 4], delay: D, config: HalfStepConfig) -> Result<Self, StepperError> {
        let mut driver = Self {
            coils,
            delay,
            config,
            position: 0,
            phase: 0,
        };
        driver.release()?;
        Ok(driver)
    }

    /// Switch every coil off
    pub fn release(&mut self) -> Result<(), StepperError> {
        for coil in &mut self.coils {
            coil.set_low().map_err(|_| StepperError::Pin)?;
        }
        Ok(())
    }

    /// Declare the current shaft position
    pub fn set_position(&mut self, position: i32) {
        self.position = position;
    }

    pub fn config(&self) -> &HalfStepConfig {
        &self.config
    }

    fn energise(&mut self) -> Result<(), StepperError> {
        let pattern = HALF_STEP_SEQUENCE[self.phase];
        for (coil, &on) in self.coils.iter_mut().zip(pattern.iter()) {
            let result = if on { coil.set_high() } else { coil.set_low() };
            result.map_err(|_| StepperError::Pin)?;
        }
        Ok(())
    }

    fn step(&mut self, forward: bool) -> Result<(), StepperError> {
        self.phase = if forward {
            (self.phase + 1) % HALF_STEP_SEQUENCE.len()
        } else {
            (self.phase + HALF_STEP_SEQUENCE.len() - 1) % HALF_STEP_SEQUENCE.len()
        };
        self.energise()?;
        self.position += if forward { 1 } else { -1 };
        self.delay.delay_us(self.config.step_delay_us);
        Ok(())
    }
}

impl<P: OutputPin, D: DelayNs> PositionStepper for HalfStepDriver<P, D> {
    fn position(&self) -> i32 {
        self.position
    }

    fn move_to(&mut self, target: i32) -> Result<(), StepperError> {
        while self.position != target {
            self.step(target > self.position)?;
        }

        if self.config.release_when_idle {
            self.release()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;
    use core::convert::Infallible;

    use super::*;

    /// Coil states shared by the four mock pins
    struct Coils {
        high: RefCell<[bool; 4]>,
    }

    struct MockPin<'a> {
        coils: &'a Coils,
        index: usize,
    }

    impl embedded_hal::digital::ErrorType for MockPin<'_> {
        type Error = Infallible;
    }

    impl OutputPin for MockPin<'_> {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.coils.high.borrow_mut()[self.index] = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.coils.high.borrow_mut()[self.index] = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDelay {
        total_us: u64,
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_us += u64::from(ns / 1_000);
        }

        fn delay_us(&mut self, us: u32) {
            self.total_us += u64::from(us);
        }
    }

    fn driver(coils: &Coils, release_when_idle: bool) -> HalfStepDriver<MockPin<'_>, MockDelay> {
        let pins = [0, 1, 2, 3].map(|index| MockPin { coils, index });
        let config = HalfStepConfig {
            step_delay_us: 1_000,
            release_when_idle,
        };
        HalfStepDriver::new(pins, MockDelay::default(), config).unwrap()
    }

    #[test]
    fn test_moves_to_target() {
        let coils = Coils {
            high: RefCell::new([true; 4]),
        };
        let mut driver = driver(&coils, false);
        assert_eq!(*coils.high.borrow(), [false; 4]);

        driver.move_to(3).unwrap();
        assert_eq!(driver.position(), 3);
        assert_eq!(driver.delay.total_us, 3_000);
        // Phase 3 is B+C
        assert_eq!(*coils.high.borrow(), [false, true, true, false]);

        driver.move_to(-2).unwrap();
        assert_eq!(driver.position(), -2);
        assert_eq!(driver.delay.total_us, 8_000);
        // Phase 6 is D
        assert_eq!(*coils.high.borrow(), [false, false, false, true]);
    }

    #[test]
    fn test_release_when_idle() {
        let coils = Coils {
            high: RefCell::new([false; 4]),
        };
        let mut driver = driver(&coils, true);
        driver.move_to(5).unwrap();
        assert_eq!(*coils.high.borrow(), [false; 4]);
        assert_eq!(driver.position(), 5);
    }

    #[test]
    fn test_move_to_current_position_is_noop() {
        let coils = Coils {
            high: RefCell::new([false; 4]),
        };
        let mut driver = driver(&coils, false);
        driver.set_position(10);
        driver.move_to(10).unwrap();
        assert_eq!(driver.delay.total_us, 0);
    }
}
