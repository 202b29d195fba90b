//! Mashtun Link Protocol
//!
//! This crate defines the line-based protocol between the brewing controller
//! and its companion app. Every message is one line of ASCII numbers:
//!
//! ```text
//! CODE|FIELD|FIELD|...\n
//! ```
//!
//! The app sends [`Command`]s. The controller answers each one with a
//! [`Update::CommandReturn`] acknowledgement followed by any requested values.

#![no_std]
#![deny(unsafe_code)]

pub mod line;
pub mod link;
pub mod messages;

pub use line::{Line, LineError, LineParser, FIELD_SEPARATOR, INVALID_CODE, MAX_FIELDS};
pub use link::{Link, LinkError};
pub use messages::{Command, CommandCode, MessageError, ParamCode, Update};
