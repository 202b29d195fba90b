//! Relay outputs

pub mod switch;

pub use switch::{RelayActuator, RelayConfig};
