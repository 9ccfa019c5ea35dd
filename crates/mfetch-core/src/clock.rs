//! Time source for the downloader.
//!
//! Monotonic time drives throttling and write coalescing; wall-clock time is
//! only recorded for display in the state journal. Backoff sleeps also go
//! through the clock so tests can run retry schedules in virtual time.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic instant (throttling, coalescing).
    fn now(&self) -> Instant;

    /// Wall-clock time for journal timestamps.
    fn wall(&self) -> DateTime<Utc>;

    /// Block the calling thread for `d`.
    fn sleep(&self, d: Duration);
}

/// Real clock backed by `Instant`, `Utc::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Virtual clock: time only moves through `advance` or `sleep`, which returns
/// immediately. Total slept time is recorded so backoff schedules can be
/// asserted without waiting for them.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    wall_base: DateTime<Utc>,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    slept: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            wall_base: Utc::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move time forward without counting it as sleep.
    pub fn advance(&self, d: Duration) {
        let mut st = self.state.lock();
        st.elapsed += d;
    }

    /// Sum of all durations passed to `sleep`.
    pub fn total_slept(&self) -> Duration {
        self.state.lock().slept
    }

    fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_base + elapsed
    }

    fn sleep(&self, d: Duration) {
        let mut st = self.state.lock();
        st.elapsed += d;
        st.slept += d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_and_records() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.sleep(Duration::from_secs(5));
        clock.sleep(Duration::from_secs(10));
        assert_eq!(clock.now() - t0, Duration::from_secs(15));
        assert_eq!(clock.total_slept(), Duration::from_secs(15));
    }

    #[test]
    fn manual_clock_advance_is_not_sleep() {
        let clock = ManualClock::new();
        let w0 = clock.wall();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.total_slept(), Duration::ZERO);
        assert_eq!((clock.wall() - w0).num_milliseconds(), 250);
    }
}
