//! Board configuration
//!
//! Constants and the `take_board_pins!` macro are generated by build.rs
//! from brew.toml.

use mashtun_drivers::stepper::HalfStepConfig;
use mashtun_drivers::valve::{PidGains, ValveConfig};

include!(concat!(env!("OUT_DIR"), "/board_config.rs"));
