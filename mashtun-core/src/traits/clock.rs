//! Monotonic time source

/// Millisecond clock
///
/// The counter may wrap; callers compare timestamps with
/// [`elapsed_ms`] rather than plain subtraction.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed point
    fn now_ms(&self) -> u32;
}

/// Milliseconds between `since` and `now`, tolerant of counter wrap
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}
