//! State machine definition
//!
//! The controller's status is a function of the previous status and an
//! event. Operations that an event does not apply to leave the status as is;
//! the controller rejects them before they reach the machine.

use super::events::Event;

/// Controller status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// At rest, no brew in progress
    Idle,
    /// Walking the recipe, actuators under closed-loop control
    Brewing,
    /// Brew paused at the current stage
    BrewingStopped,
    /// Recipe store unusable; only a memory clear recovers
    Error,
}

impl Status {
    /// Wire and persistence code of the status
    pub const fn code(self) -> u8 {
        match self {
            Status::Idle => 0,
            Status::Brewing => 1,
            Status::BrewingStopped => 2,
            Status::Error => 3,
        }
    }

    /// Status from its code
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Status::Idle),
            1 => Some(Status::Brewing),
            2 => Some(Status::BrewingStopped),
            3 => Some(Status::Error),
            _ => None,
        }
    }

    /// Check if the recipe is being walked
    pub fn is_brewing(&self) -> bool {
        matches!(self, Status::Brewing)
    }

    /// Check if actuators may be driven by hand
    pub fn manual_control_allowed(&self) -> bool {
        matches!(self, Status::Idle | Status::BrewingStopped)
    }

    /// Check if this is the error state
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error)
    }

    /// Process an event and return the next status
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use Status::*;

        match (self, event) {
            // Error is left only by formatting the region
            (Error, MemoryCleared) => Idle,
            (Error, _) => Error,
            (_, StoreCorrupted) => Error,
            (_, MemoryCleared) => Idle,

            // Idle transitions
            (Idle, Start) => Brewing,
            (Idle, Restart) => Brewing,

            // Brewing transitions
            (Brewing, Restart) => Brewing,
            (Brewing, Stop) => BrewingStopped,
            (Brewing, RecipeFinished) => Idle,
            (Brewing, Reset) => Idle,

            // BrewingStopped transitions
            (BrewingStopped, Resume) => Brewing,
            (BrewingStopped, Restart) => Brewing,
            (BrewingStopped, Reset) => Idle,

            // Default: stay in current state
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brew_flow() {
        let brewing = Status::Idle.transition(Event::Start);
        assert_eq!(brewing, Status::Brewing);

        let stopped = brewing.transition(Event::Stop);
        assert_eq!(stopped, Status::BrewingStopped);

        let resumed = stopped.transition(Event::Resume);
        assert_eq!(resumed, Status::Brewing);

        let done = resumed.transition(Event::RecipeFinished);
        assert_eq!(done, Status::Idle);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        for status in [Status::Idle, Status::Brewing, Status::BrewingStopped] {
            assert_eq!(status.transition(Event::Reset), Status::Idle);
        }
    }

    #[test]
    fn test_error_is_terminal() {
        for status in [Status::Idle, Status::Brewing, Status::BrewingStopped] {
            assert_eq!(status.transition(Event::StoreCorrupted), Status::Error);
        }

        for event in [Event::Start, Event::Restart, Event::Resume, Event::Reset] {
            assert_eq!(Status::Error.transition(event), Status::Error);
        }

        assert_eq!(Status::Error.transition(Event::MemoryCleared), Status::Idle);
    }

    #[test]
    fn test_ignored_events() {
        assert_eq!(Status::Idle.transition(Event::Stop), Status::Idle);
        assert_eq!(Status::Idle.transition(Event::Resume), Status::Idle);
        assert_eq!(Status::BrewingStopped.transition(Event::Stop), Status::BrewingStopped);
    }

    #[test]
    fn test_status_codes() {
        for status in [
            Status::Idle,
            Status::Brewing,
            Status::BrewingStopped,
            Status::Error,
        ] {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(4), None);
    }

    #[test]
    fn test_manual_control() {
        assert!(Status::Idle.manual_control_allowed());
        assert!(Status::BrewingStopped.manual_control_allowed());
        assert!(!Status::Brewing.manual_control_allowed());
        assert!(!Status::Error.manual_control_allowed());
    }
}
