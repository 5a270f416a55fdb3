//! Retry and poll engine.
//!
//! A [`Probe`] evaluates a success condition once; a [`Poller`] repeats it a
//! bounded number of times with a delay between attempts. [`retry`] wraps
//! both in a fluent interface:
//!
//! ```
//! use std::time::Duration;
//! use warden_core::retry::retry;
//!
//! let mut n = 0;
//! let value = retry(|| {
//!     n += 1;
//!     n
//! })
//! .delay(Duration::ZERO)
//! .until(3)
//! .unwrap();
//! assert_eq!(value, 3);
//! ```

mod poller;
mod probe;
mod sleeper;

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use poller::{DEFAULT_DELAY, DEFAULT_TRIES, Poller};
pub use probe::{CatchingProbe, Outcome, Probe, ProbeResult, UntilProbe, calling};
pub use sleeper::{RecordingSleeper, Sleeper, ThreadSleeper};

// =============================================================================
// RetryError
// =============================================================================

/// Why a retried operation did not succeed.
#[derive(Debug)]
pub enum RetryError<T, E> {
    /// `tries` was zero; the operation was never called.
    NoAttempts,

    /// Every attempt was made and none succeeded.
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Result of the final attempt.
        last: Box<ProbeResult<T, E>>,
    },

    /// The operation failed with an error it was not told to tolerate.
    Uncaught(E),

    /// The message pattern did not compile.
    InvalidPattern(regex::Error),
}

impl<T, E> RetryError<T, E> {
    /// Returns the error the caller should see in place of the value.
    ///
    /// For an exhausted `catching` retry this is the last tolerated error;
    /// for an uncaught failure it is the failure itself.
    #[must_use]
    pub fn into_raised(self) -> Option<E> {
        match self {
            Self::Uncaught(error) => Some(error),
            Self::Exhausted { last, .. } => match last.outcome {
                Outcome::Raised(error) => Some(error),
                Outcome::Returned(_) => None,
            },
            Self::NoAttempts | Self::InvalidPattern(_) => None,
        }
    }

    /// Returns the last returned value of an exhausted retry.
    #[must_use]
    pub fn last_value(&self) -> Option<&T> {
        match self {
            Self::Exhausted { last, .. } => last.returned_value(),
            _ => None,
        }
    }

    /// Returns true if the attempts ran out.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::NoAttempts | Self::Exhausted { .. })
    }
}

impl<T, E: fmt::Display> fmt::Display for RetryError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAttempts => write!(f, "retry made no attempts (tries = 0)"),
            Self::Exhausted { attempts, last } => match last.raised_error() {
                Some(error) => write!(f, "condition not met after {attempts} attempts: {error}"),
                None => write!(f, "condition not met after {attempts} attempts"),
            },
            Self::Uncaught(error) => write!(f, "{error}"),
            Self::InvalidPattern(error) => write!(f, "invalid message pattern: {error}"),
        }
    }
}

impl<T, E> std::error::Error for RetryError<T, E>
where
    T: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Uncaught(error) => error.source(),
            Self::InvalidPattern(error) => Some(error),
            Self::NoAttempts | Self::Exhausted { .. } => None,
        }
    }
}

// =============================================================================
// Retry
// =============================================================================

/// Starts a fluent retry of `func`.
///
/// Defaults to [`DEFAULT_TRIES`] attempts, [`DEFAULT_DELAY`] apart.
pub fn retry<F>(func: F) -> Retry<F> {
    Retry {
        func,
        tries: DEFAULT_TRIES,
        delay: DEFAULT_DELAY,
        sleeper: Arc::new(ThreadSleeper),
    }
}

/// Pending retry of an operation. Built by [`retry`].
#[must_use = "a retry does nothing until a terminal method is called"]
pub struct Retry<F> {
    func: F,
    tries: u32,
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl<F> Retry<F> {
    /// Sets the maximum number of attempts.
    pub fn tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    /// Sets the delay between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replaces the sleeper used between attempts.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn poller(&self) -> Poller {
        Poller::new(self.tries, self.delay).with_sleeper(Arc::clone(&self.sleeper))
    }
}

impl<F, T> Retry<F>
where
    F: FnMut() -> T,
{
    /// Calls until the returned value equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Exhausted`] carrying the last value, or
    /// [`RetryError::NoAttempts`] when `tries` is zero.
    pub fn until(self, expected: T) -> Result<T, RetryError<T, Infallible>>
    where
        T: PartialEq,
    {
        let poller = self.poller();
        let mut probe = UntilProbe::new(self.func, expected);
        poller.check(&mut probe).map(into_value)
    }

    /// Calls until `matcher` accepts the returned value.
    ///
    /// # Errors
    ///
    /// Same as [`Retry::until`].
    pub fn until_matches(
        self,
        matcher: impl Fn(&T) -> bool,
    ) -> Result<T, RetryError<T, Infallible>> {
        let poller = self.poller();
        let mut probe = UntilProbe::matching(self.func, matcher);
        poller.check(&mut probe).map(into_value)
    }
}

impl<F, T, E> Retry<F>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
{
    /// Calls until the operation returns, tolerating errors accepted by `kind`.
    ///
    /// A tolerated error whose message matches `pattern` also ends the
    /// retry and is handed back as [`Outcome::Raised`]. An empty `pattern`
    /// never matches, so tolerated errors are always retried.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Uncaught`] on the first error `kind` rejects
    /// - [`RetryError::Exhausted`] when tolerated errors persist; recover the
    ///   last one with [`RetryError::into_raised`]
    /// - [`RetryError::InvalidPattern`] if `pattern` is not a valid regex
    pub fn catching(
        self,
        kind: impl Fn(&E) -> bool,
        pattern: &str,
    ) -> Result<Outcome<T, E>, RetryError<T, E>> {
        let poller = self.poller();
        let mut probe = CatchingProbe::with_pattern(self.func, kind, pattern)
            .map_err(RetryError::InvalidPattern)?;
        poller.check(&mut probe).map(|result| result.outcome)
    }
}

impl<F> fmt::Debug for Retry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("tries", &self.tries)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

fn into_value<T>(result: ProbeResult<T, Infallible>) -> T {
    match result.outcome {
        Outcome::Returned(value) => value,
        Outcome::Raised(never) => match never {},
    }
}
