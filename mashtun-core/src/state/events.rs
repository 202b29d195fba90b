//! Events that trigger state transitions

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Brew control events
    /// Start the recipe from an idle controller
    Start,
    /// Start the recipe over from the first stage
    Restart,
    /// Continue a stopped brew at its current stage
    Resume,
    /// Pause a running brew
    Stop,
    /// Abandon the brew and return to rest
    Reset,

    // Recipe events
    /// Last stage's duration elapsed
    RecipeFinished,

    // Fault events
    /// Persistent recipe image failed to decode or write
    StoreCorrupted,
    /// Region was formatted
    MemoryCleared,
}
