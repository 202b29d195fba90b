//! Controller state machine
//!
//! The state machine is explicit, finite, and deterministic. The control
//! engine feeds it events and acts on the resulting status.

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::Status;
