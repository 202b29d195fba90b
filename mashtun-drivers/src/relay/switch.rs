//! On/off relay actuator
//!
//! Drives a heating element, pump or solenoid through a relay or SSR on one
//! GPIO. The output switches on below `target - tolerance` and off at
//! `target`; in between it holds its state.

use embedded_hal::digital::OutputPin;
use mashtun_core::traits::{Actuator, ActuatorError};

/// Relay wiring
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayConfig {
    /// If true, relay ON = pin LOW
    pub active_low: bool,
}

/// Relay actuator with a hysteresis band
pub struct RelayActuator<P> {
    pin: P,
    config: RelayConfig,
    reference: f32,
    tolerance: f32,
    /// Current logical state (true = relay on)
    on: bool,
}

impl<P: OutputPin> RelayActuator<P> {
    /// Create a relay actuator, switched off
    pub fn new(pin: P, config: RelayConfig) -> Result<Self, ActuatorError> {
        let mut relay = Self {
            pin,
            config,
            reference: 0.0,
            tolerance: 0.0,
            on: true,
        };
        relay.switch(false)?;
        Ok(relay)
    }

    fn switch(&mut self, on: bool) -> Result<(), ActuatorError> {
        if on == self.on {
            return Ok(());
        }

        let result = if on != self.config.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|_| ActuatorError::DriveFailed)?;
        self.on = on;
        Ok(())
    }
}

impl<P: OutputPin> Actuator for RelayActuator<P> {
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
        if ignore_input {
            return self.switch(true);
        }
        if !input.is_finite() {
            return Err(ActuatorError::InvalidInput);
        }

        if input >= self.reference {
            self.switch(false)
        } else if input < self.reference - self.tolerance {
            self.switch(true)
        } else {
            Ok(())
        }
    }

    fn deactivate(&mut self) {
        if let Err(_e) = self.switch(false) {
            #[cfg(feature = "defmt")]
            defmt::warn!("relay stuck on: {}", _e);
        }
    }

    fn is_active(&self) -> bool {
        self.on
    }
}
