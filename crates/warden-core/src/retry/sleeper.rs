//! Injectable delay between poll attempts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Waits between two probe attempts.
pub trait Sleeper: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread. A zero duration returns immediately
/// without yielding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps without sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    call_count: AtomicU64,
    durations: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `sleep` calls so far.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requested durations, in call order.
    #[must_use]
    pub fn durations(&self) -> Vec<Duration> {
        self.durations.lock().clone()
    }

    /// Sum of all requested durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.durations.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.durations.lock().push(duration);
    }
}
