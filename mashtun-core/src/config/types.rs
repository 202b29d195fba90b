//! Configuration type definitions
//!
//! Controller settings and the pin map supplied by the board, plus the small
//! header persisted at the start of the region.

use core::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Maximum number of registered devices (sensors + actuators)
pub const MAX_DEVICES: usize = 6;

/// Largest persistent region the store can mirror in RAM
pub const MAX_REGION_SIZE: usize = 4096;

/// Last address of the configuration header
pub const CONFIG_END: usize = 10;

/// First address of the recipe section
pub const RECIPE_START: usize = CONFIG_END + 1;

/// Smallest region that holds the header, one empty recipe and a stage
pub const MIN_REGION_SIZE: usize = RECIPE_START + 8;

/// Default duration unit: one minute
pub const DEFAULT_TIME_UNIT_MS: u32 = 60_000;

/// Physical pins that can host a device
///
/// Pins are indexed digital range first, then analog range. The index
/// orders registry slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMap {
    /// Digital pins usable for devices
    pub digital: RangeInclusive<u8>,
    /// Analog-capable pins usable for devices
    pub analog: RangeInclusive<u8>,
}

impl PinMap {
    /// Create a pin map from a digital and an analog range
    pub const fn new(digital: RangeInclusive<u8>, analog: RangeInclusive<u8>) -> Self {
        Self { digital, analog }
    }

    /// Index of a pin in the combined digital + analog space
    pub fn index_of(&self, pin: u8) -> Option<usize> {
        if self.digital.contains(&pin) {
            Some((pin - self.digital.start()) as usize)
        } else if self.analog.contains(&pin) {
            Some(self.digital_count() + (pin - self.analog.start()) as usize)
        } else {
            None
        }
    }

    /// Check if a pin can host a device
    pub fn contains(&self, pin: u8) -> bool {
        self.index_of(pin).is_some()
    }

    /// Check if a pin is in the analog range
    pub fn is_analog(&self, pin: u8) -> bool {
        self.analog.contains(&pin)
    }

    fn digital_count(&self) -> usize {
        self.digital.clone().count()
    }
}

impl Default for PinMap {
    /// RP2040: GPIO2..=22 (GPIO0/1 carry the console UART), ADC on GPIO26..=28
    fn default() -> Self {
        Self::new(2..=22, 26..=28)
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Milliseconds per stage-duration unit
    pub time_unit_ms: u32,
    /// Pins available to the device registry
    pub pins: PinMap,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            time_unit_ms: DEFAULT_TIME_UNIT_MS,
            pins: PinMap::default(),
        }
    }
}

/// Persisted header format version
///
/// A blank device reads `0xFF` here and gets formatted on load.
pub const HEADER_VERSION: u8 = 1;

/// Configuration header stored in bytes `0..=CONFIG_END`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigHeader {
    /// Layout version
    pub version: u8,
    /// Pin of the primary temperature sensor
    pub main_sensor_pin: u8,
    /// Pin of the primary actuator
    pub main_actuator_pin: u8,
    /// Controller status code at the last transition
    pub status: u8,
    /// Stage position at the last transition
    pub stage: u16,
}

impl ConfigHeader {
    /// Create a header for an idle controller
    pub const fn new(main_sensor_pin: u8, main_actuator_pin: u8) -> Self {
        Self {
            version: HEADER_VERSION,
            main_sensor_pin,
            main_actuator_pin,
            status: 0,
            stage: 0,
        }
    }

    /// Serialize into the header bytes
    pub fn write_to(&self, header: &mut [u8]) -> Result<(), Error> {
        postcard::to_slice(self, header).map_err(|_| Error::CorruptStore)?;
        Ok(())
    }

    /// Deserialize from the header bytes
    ///
    /// Returns `None` for a header written by another format version.
    pub fn read_from(header: &[u8]) -> Option<Self> {
        if header.first() != Some(&HEADER_VERSION) {
            return None;
        }
        postcard::from_bytes(header).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_index_digital_before_analog() {
        let pins = PinMap::new(2..=13, 14..=19);
        assert_eq!(pins.index_of(2), Some(0));
        assert_eq!(pins.index_of(13), Some(11));
        assert_eq!(pins.index_of(14), Some(12));
        assert_eq!(pins.index_of(19), Some(17));
        assert_eq!(pins.index_of(0), None);
        assert_eq!(pins.index_of(20), None);
        assert!(pins.is_analog(15));
        assert!(!pins.is_analog(5));
    }

    #[test]
    fn test_default_pin_map_skips_uart() {
        let pins = PinMap::default();
        assert!(!pins.contains(0));
        assert!(!pins.contains(1));
        assert!(pins.contains(26));
        assert!(!pins.contains(29));
    }

    #[test]
    fn test_header_fits_config_section() {
        let header = ConfigHeader {
            status: 2,
            stage: 7,
            ..ConfigHeader::new(26, 6)
        };
        let mut bytes = [0xFFu8; CONFIG_END + 1];
        header.write_to(&mut bytes).unwrap();
        assert_eq!(ConfigHeader::read_from(&bytes), Some(header));
    }

    #[test]
    fn test_blank_header_rejected() {
        let bytes = [0xFFu8; CONFIG_END + 1];
        assert_eq!(ConfigHeader::read_from(&bytes), None);
    }
}
