//! Controller error type
//!
//! Every fallible operation in the core funnels into [`Error`]. Variants are
//! `Copy` so they can be returned from the tick loop and acknowledged over the
//! link without allocation.

use core::fmt;

/// Errors reported by controller operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Pin, position or field value out of range
    InvalidArgument,
    /// No stage, process or device matches the request
    NotFound,
    /// Device slots or recipe memory exhausted
    Full,
    /// Operation not allowed in the current controller state
    InvalidState,
    /// Persistent image failed to decode or could not be written
    CorruptStore,
}

impl Error {
    /// Check if this error leaves the controller inoperable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CorruptStore)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotFound => write!(f, "not found"),
            Self::Full => write!(f, "capacity exhausted"),
            Self::InvalidState => write!(f, "invalid controller state"),
            Self::CorruptStore => write!(f, "corrupt recipe store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(Error::CorruptStore.is_fatal());
        assert!(!Error::Full.is_fatal());
        assert!(!Error::InvalidState.is_fatal());
    }
}
