//! Time source for the transaction poll loop.

use std::time::{Duration, Instant};

/// Monotonic time and the poll-interval sleep.
pub trait Clock {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Yield the calling thread for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Wall-clock time via [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to.
///
/// `sleep` returns immediately and advances the clock by the requested
/// duration, so timeouts can be driven deterministically in tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            sleeps: Vec::new(),
        }
    }

    /// Move the clock forward without recording a sleep.
    pub fn advance(&mut self, duration: Duration) {
        self.elapsed += duration;
    }

    /// Total time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Every sleep requested, in order.
    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        self.elapsed += duration;
    }
}
