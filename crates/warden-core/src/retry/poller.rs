//! Bounded repetition of a probe.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::RetryError;
use super::probe::{Probe, ProbeResult};
use super::sleeper::{Sleeper, ThreadSleeper};

/// Default number of attempts.
pub const DEFAULT_TRIES: u32 = 100;

/// Default delay between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Drives a [`Probe`] up to `tries` times.
///
/// The sleeper runs strictly between attempts: `tries` attempts produce
/// exactly `tries - 1` sleeps, none before the first or after the last.
#[derive(Clone)]
pub struct Poller {
    tries: u32,
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Poller {
    /// Creates a poller sleeping on the current thread.
    #[must_use]
    pub fn new(tries: u32, delay: Duration) -> Self {
        Self {
            tries,
            delay,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Creates a poller that keeps trying for roughly `timeout`.
    ///
    /// Makes at least one attempt; with a zero `delay` it makes exactly one.
    #[must_use]
    pub fn within(timeout: Duration, delay: Duration) -> Self {
        let tries = if delay.is_zero() {
            1
        } else {
            let attempts = timeout.as_nanos().div_ceil(delay.as_nanos()) + 1;
            u32::try_from(attempts).unwrap_or(u32::MAX)
        };
        Self::new(tries, delay)
    }

    /// Replaces the sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn tries(&self) -> u32 {
        self.tries
    }

    /// Delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Evaluates `probe` until it succeeds or attempts run out.
    ///
    /// # Errors
    ///
    /// - [`RetryError::NoAttempts`] when `tries` is zero; the probe is never called
    /// - [`RetryError::Exhausted`] with the last result when no attempt succeeded
    /// - [`RetryError::Uncaught`] as soon as the probe returns an error
    pub fn check<P: Probe>(
        &self,
        probe: &mut P,
    ) -> Result<ProbeResult<P::Output, P::Error>, RetryError<P::Output, P::Error>> {
        let mut last = None;

        for attempt in 1..=self.tries {
            if attempt > 1 {
                self.sleeper.sleep(self.delay);
            }

            let result = probe.call().map_err(RetryError::Uncaught)?;
            if result.success {
                return Ok(result);
            }

            tracing::trace!(attempt, tries = self.tries, "probe not satisfied");
            last = Some(result);
        }

        match last {
            Some(last) => Err(RetryError::Exhausted {
                attempts: self.tries,
                last: Box::new(last),
            }),
            None => Err(RetryError::NoAttempts),
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_TRIES, DEFAULT_DELAY)
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("tries", &self.tries)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
