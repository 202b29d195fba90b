//! Stepper driver implementations

pub mod half_step;

pub use half_step::{HalfStepConfig, HalfStepDriver};

/// Errors reported by a stepper driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepperError {
    /// A coil output could not be driven
    Pin,
}

/// Stepper that moves to absolute positions
///
/// Positions are in steps relative to where the driver was created.
/// `move_to` blocks until the motor has arrived.
pub trait PositionStepper {
    /// Current position in steps
    fn position(&self) -> i32;

    /// Move to an absolute position
    fn move_to(&mut self, target: i32) -> Result<(), StepperError>;
}

impl<T: PositionStepper + ?Sized> PositionStepper for &mut T {
    fn position(&self) -> i32 {
        (**self).position()
    }

    fn move_to(&mut self, target: i32) -> Result<(), StepperError> {
        (**self).move_to(target)
    }
}
