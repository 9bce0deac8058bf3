//! Monotonic time sources.
//!
//! All slot timestamps and idle stamps are monotonic microsecond readings.
//! The source is injected through the [`Clock`] trait so production code runs
//! on [`std::time::Instant`] while tests drive timeouts deterministically with
//! a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic microsecond clock.
pub trait Clock: Send {
    /// Microseconds elapsed since the clock's origin.
    fn now_micros(&self) -> u64;
}

/// Production clock backed by [`Instant`]; origin is construction time.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        // u64 micros covers ~584k years of uptime, no wrap handling needed
        self.origin.elapsed().as_micros() as u64
    }
}

/// Manually-advanced clock for tests.
///
/// Clones share the same underlying reading, so a test can hand one clone to
/// the outbox and keep another to advance time between calls.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the reading by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.now
            .fetch_add(delta.as_micros() as u64, Ordering::SeqCst);
    }

    /// Set the reading to an absolute microsecond value.
    pub fn set_micros(&self, micros: u64) {
        self.now.store(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_clones_share_state() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_millis(150));
        assert_eq!(clock.now_micros(), 150_000);
        clock.set_micros(42);
        assert_eq!(handle.now_micros(), 42);
    }
}
