//! Gas valve actuators

pub mod pid_gas;

pub use pid_gas::{PidGains, PidGasValve, ValveConfig};
