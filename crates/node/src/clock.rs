//! Monotonic millisecond tick used by the scheduler and every deadline in
//! the control core.
//!
//! The counter is allowed to wrap.  All arithmetic goes through
//! `wrapping_*` and comparisons use the signed distance between two ticks,
//! so a deadline armed just before the wrap still compares correctly just
//! after it.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub const fn from_millis(ms: u64) -> Self {
        Tick(ms)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// The tick `ms` milliseconds after `self`.
    pub const fn after(self, ms: u64) -> Self {
        Tick(self.0.wrapping_add(ms))
    }

    /// Signed distance `self - earlier` in milliseconds.
    pub const fn since(self, earlier: Tick) -> i64 {
        self.0.wrapping_sub(earlier.0) as i64
    }

    /// True once `self` (the current time) has reached `deadline`.
    pub const fn has_reached(self, deadline: Tick) -> bool {
        self.since(deadline) >= 0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
