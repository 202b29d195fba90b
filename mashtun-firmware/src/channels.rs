//! Inter-task communication channels
//!
//! The controller task owns the controller. Link tasks reach it only
//! through these channels.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use mashtun_core::dispatch::MAX_REPLIES;
use mashtun_protocol::{Command, Link, LinkError, MessageError, Update};

/// Channel capacity for decoded commands
const COMMAND_CHANNEL_SIZE: usize = 4;

/// Channel capacity for outgoing updates (two full reply sets)
const UPDATE_CHANNEL_SIZE: usize = 2 * MAX_REPLIES;

/// Commands from the app, or the decode error of a line that did not parse
pub static COMMAND_CHANNEL: Channel<
    CriticalSectionRawMutex,
    Result<Command, MessageError>,
    COMMAND_CHANNEL_SIZE,
> = Channel::new();

/// Updates waiting for the link TX task
pub static UPDATE_CHANNEL: Channel<CriticalSectionRawMutex, Update, UPDATE_CHANNEL_SIZE> =
    Channel::new();

/// Link endpoint used by the controller task
pub struct ChannelLink;

impl ChannelLink {
    /// Check if a complete reply set fits the outgoing queue
    pub fn has_room_for_replies(&self) -> bool {
        UPDATE_CHANNEL.free_capacity() >= MAX_REPLIES
    }
}

impl Link for ChannelLink {
    fn send(&mut self, update: &Update) -> Result<(), LinkError> {
        UPDATE_CHANNEL.try_send(*update).map_err(|_| LinkError::Busy)
    }

    fn try_receive(&mut self) -> Option<Result<Command, MessageError>> {
        COMMAND_CHANNEL.try_receive().ok()
    }
}
