//! Monotonic time sources for the registry.
//!
//! Timestamps are plain milliseconds since a clock-specific origin, which
//! keeps entry arithmetic trivial and lets tests drive time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Source of monotonic milliseconds.
pub trait Clock: Send + Sync {
    /// Returns milliseconds elapsed since the clock's origin.
    fn now_ms(&self) -> u64;
}

/// Clock backed by `tokio::time::Instant`.
///
/// Outside a runtime this behaves like `std::time::Instant`. Inside a runtime
/// with paused time (tests) it follows the runtime's virtual clock, so
/// scheduler tests and registry timestamps agree.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        crate::duration_to_millis(self.origin.elapsed())
    }
}

/// Hand-driven clock for tests and deterministic simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock starting at `start_ms`.
    #[must_use]
    pub const fn starting_at(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now
            .fetch_add(crate::duration_to_millis(by), Ordering::SeqCst);
    }

    /// Jumps to an absolute time. Going backwards is ignored.
    pub fn set_ms(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
