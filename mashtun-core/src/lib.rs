//! Board-agnostic core logic for the brewing controller
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Hardware abstraction traits (sensor, actuator, clock, storage)
//! - Numeric codec for the persistent recipe
//! - Recipe store and device registry
//! - State machine and control engine
//! - Command dispatcher for the app link
//! - Configuration type definitions

#![no_std]
#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod recipe;
pub mod registry;
pub mod state;
pub mod traits;

pub use controller::{Controller, ControllerState, Fault, FaultKind, TickEvent, TickOutcome};
pub use error::Error;
