//! Transport abstraction
//!
//! A link moves messages between the controller and the app. The control loop
//! polls it between ticks, so neither side of the trait may block.

use crate::messages::{Command, MessageError, Update};

/// Errors that can occur while sending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Outgoing queue is full; the update was dropped
    Busy,
    /// Transport is down
    Disconnected,
}

/// Bidirectional message link
pub trait Link {
    /// Queue an update for the app
    fn send(&mut self, update: &Update) -> Result<(), LinkError>;

    /// Take the next received command, if one is complete
    ///
    /// `Some(Err(_))` reports a line that arrived but could not be decoded.
    fn try_receive(&mut self) -> Option<Result<Command, MessageError>>;
}

impl<L: Link + ?Sized> Link for &mut L {
    fn send(&mut self, update: &Update) -> Result<(), LinkError> {
        (**self).send(update)
    }

    fn try_receive(&mut self) -> Option<Result<Command, MessageError>> {
        (**self).try_receive()
    }
}
