//! Temperature sensor implementations

pub mod ntc;

pub use ntc::{AdcError, AdcReader, NtcSensor};
