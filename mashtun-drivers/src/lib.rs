//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in mashtun-core for the brewery hardware:
//!
//! - Gas valve under PID control (stepper-driven knob)
//! - Stepper drivers (4-coil unipolar, half-step)
//! - Relay outputs (heaters, pumps)
//! - Temperature sensors (NTC thermistor)

#![no_std]
#![deny(unsafe_code)]

pub mod relay;
pub mod sensor;
pub mod stepper;
pub mod valve;
