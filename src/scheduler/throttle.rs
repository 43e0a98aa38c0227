//! Rate limiting for sweep triggers.

use std::time::Duration;
use tokio::time::Instant;

/// Leading-edge throttle: the first call in a window passes, the rest are dropped.
#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last: Option<Instant>,
}

impl Throttle {
    /// Creates a throttle with the given window. A zero window never throttles.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// The throttle window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` and opens a new window if the previous one has elapsed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let open = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.window);
        if open {
            self.last = Some(now);
        }
        open
    }
}

/// Trailing-edge debounce: fires once `delay` after the last poke.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    /// Creates an unarmed debounce.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Cancels any pending deadline and schedules a new one.
    pub fn poke(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Cancels the pending deadline.
    pub const fn cancel(&mut self) {
        self.deadline = None;
    }

    /// The pending deadline, if armed.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarms and returns `true` if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            },
            _ => false,
        }
    }
}
