//! Actuator capability

use crate::error::Error;

/// Errors that can occur while driving an actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActuatorError {
    /// Output driver did not accept the command
    DriveFailed,
    /// Input is not a usable reading (NaN, infinite)
    InvalidInput,
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        match e {
            ActuatorError::DriveFailed => Error::InvalidState,
            ActuatorError::InvalidInput => Error::InvalidArgument,
        }
    }
}

/// Trait for closed-loop actuators (gas valve, heating element relay, pump)
///
/// The controller sets the reference for the current stage or process and
/// then feeds every reading through [`Actuator::act`]. How the reading turns
/// into output (PID, hysteresis, ...) is up to the implementation.
pub trait Actuator {
    /// Set the target value and tolerance the next readings are compared to
    fn set_reference(&mut self, reference: f32, tolerance: f32);

    /// Get the current target value
    fn reference(&self) -> f32;

    /// Get the current tolerance
    fn tolerance(&self) -> f32;

    /// React to a reading
    ///
    /// With `ignore_input` set the actuator is forced fully on (manual
    /// override) and `input` is not looked at.
    fn act(&mut self, input: f32, ignore_input: bool) -> Result<(), ActuatorError>;

    /// Drive the output to its idle level
    fn deactivate(&mut self);

    /// Check if the actuator is currently driving its output
    fn is_active(&self) -> bool;

    /// Shut the output down completely at the end of a brew
    ///
    /// Defaults to [`Actuator::deactivate`]. Actuators whose idle level is
    /// not fully off (a gas valve at minimum flame) override this.
    fn release(&mut self) {
        self.deactivate();
    }
}
