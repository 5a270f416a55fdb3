//! Single evaluations of a success condition.
//!
//! A probe never retries; repetition is the [`Poller`](super::Poller)'s job.
//! An expected failure is reported as an unsuccessful [`ProbeResult`]; only
//! an error the probe was not told to tolerate comes back as `Err`.

use std::convert::Infallible;
use std::fmt;

use regex::Regex;

/// What the probed operation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// It returned a value.
    Returned(T),
    /// It failed with a tolerated error.
    Raised(E),
}

/// Result of one probe evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult<T, E> {
    /// Whether the condition was satisfied.
    pub success: bool,
    /// What the operation did.
    pub outcome: Outcome<T, E>,
}

impl<T, E> Outcome<T, E> {
    /// Converts into the returned value, discarding a raised error.
    #[must_use]
    pub fn into_returned(self) -> Option<T> {
        match self {
            Self::Returned(value) => Some(value),
            Self::Raised(_) => None,
        }
    }
}

impl<T, E> ProbeResult<T, E> {
    /// A result carrying a returned value.
    #[must_use]
    pub const fn returned(success: bool, value: T) -> Self {
        Self {
            success,
            outcome: Outcome::Returned(value),
        }
    }

    /// A result carrying a tolerated error.
    #[must_use]
    pub const fn raised(success: bool, error: E) -> Self {
        Self {
            success,
            outcome: Outcome::Raised(error),
        }
    }

    /// The returned value, if the operation returned.
    #[must_use]
    pub const fn returned_value(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Returned(value) => Some(value),
            Outcome::Raised(_) => None,
        }
    }

    /// The tolerated error, if the operation raised.
    #[must_use]
    pub const fn raised_error(&self) -> Option<&E> {
        match &self.outcome {
            Outcome::Returned(_) => None,
            Outcome::Raised(error) => Some(error),
        }
    }
}

/// A deferred, repeatable evaluation of a condition.
pub trait Probe {
    /// Value produced by the probed operation.
    type Output;
    /// Error type of the probed operation.
    type Error;

    /// Evaluates the condition once.
    ///
    /// `Err` means an error the probe does not tolerate; it must be
    /// propagated without further attempts.
    fn call(&mut self) -> Result<ProbeResult<Self::Output, Self::Error>, Self::Error>;
}

/// Captures the outcome of a single call without judging it.
///
/// `success` is true when the call returned.
pub fn calling<T, E>(func: impl FnOnce() -> Result<T, E>) -> ProbeResult<T, E> {
    match func() {
        Ok(value) => ProbeResult::returned(true, value),
        Err(error) => ProbeResult::raised(false, error),
    }
}

// =============================================================================
// UntilProbe
// =============================================================================

/// Calls an operation and tests its return value.
pub struct UntilProbe<'a, T, F> {
    func: F,
    matcher: Box<dyn Fn(&T) -> bool + 'a>,
}

impl<'a, T, F> UntilProbe<'a, T, F>
where
    F: FnMut() -> T,
{
    /// Succeeds when the returned value equals `expected`.
    pub fn new(func: F, expected: T) -> Self
    where
        T: PartialEq + 'a,
    {
        Self::matching(func, move |value| *value == expected)
    }

    /// Succeeds when `matcher` accepts the returned value.
    pub fn matching(func: F, matcher: impl Fn(&T) -> bool + 'a) -> Self {
        Self {
            func,
            matcher: Box::new(matcher),
        }
    }
}

impl<T, F> Probe for UntilProbe<'_, T, F>
where
    F: FnMut() -> T,
{
    type Output = T;
    type Error = Infallible;

    fn call(&mut self) -> Result<ProbeResult<T, Infallible>, Infallible> {
        let value = (self.func)();
        let success = (self.matcher)(&value);
        Ok(ProbeResult::returned(success, value))
    }
}

impl<T, F> fmt::Debug for UntilProbe<'_, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UntilProbe").finish_non_exhaustive()
    }
}

// =============================================================================
// CatchingProbe
// =============================================================================

/// Calls a fallible operation, tolerating errors of an expected kind.
///
/// - returns normally: success, value attached
/// - fails with an error `kind` accepts: tolerated and attached; success only
///   if the rendered error matches `pattern` (no pattern never matches)
/// - fails with any other error: propagated as `Err`
pub struct CatchingProbe<'a, F, E> {
    func: F,
    kind: Box<dyn Fn(&E) -> bool + 'a>,
    pattern: Option<Regex>,
}

impl<'a, T, E, F> CatchingProbe<'a, F, E>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
{
    /// Creates a probe tolerating errors accepted by `kind`.
    pub fn new(func: F, kind: impl Fn(&E) -> bool + 'a, pattern: Option<Regex>) -> Self {
        Self {
            func,
            kind: Box::new(kind),
            pattern,
        }
    }

    /// Creates a probe from a textual pattern; an empty string means none.
    pub fn with_pattern(
        func: F,
        kind: impl Fn(&E) -> bool + 'a,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        let pattern = if pattern.is_empty() {
            None
        } else {
            Some(Regex::new(pattern)?)
        };
        Ok(Self::new(func, kind, pattern))
    }
}

impl<T, E, F> Probe for CatchingProbe<'_, F, E>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
{
    type Output = T;
    type Error = E;

    fn call(&mut self) -> Result<ProbeResult<T, E>, E> {
        match (self.func)() {
            Ok(value) => Ok(ProbeResult::returned(true, value)),
            Err(error) if (self.kind)(&error) => {
                let success = self
                    .pattern
                    .as_ref()
                    .is_some_and(|re| re.is_match(&error.to_string()));
                Ok(ProbeResult::raised(success, error))
            }
            Err(error) => Err(error),
        }
    }
}

impl<F, E> fmt::Debug for CatchingProbe<'_, F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatchingProbe")
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Key(String),
        Value(String),
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Key(msg) => write!(f, "KeyError: {msg}"),
                Self::Value(msg) => write!(f, "ValueError: {msg}"),
            }
        }
    }

    fn is_key(e: &TestError) -> bool {
        matches!(e, TestError::Key(_))
    }

    fn is_value(e: &TestError) -> bool {
        matches!(e, TestError::Value(_))
    }

    #[test]
    fn test_calling_returns() {
        let result = calling(|| Ok::<_, TestError>(1));
        assert_eq!(result, ProbeResult::returned(true, 1));
    }

    #[test]
    fn test_calling_raises() {
        let result = calling(|| Err::<i32, _>(TestError::Key("boom".into())));
        assert!(!result.success);
        assert_eq!(result.raised_error(), Some(&TestError::Key("boom".into())));
    }

    #[test]
    fn test_until_probe_match() {
        let mut probe = UntilProbe::new(|| 0, 0);
        assert_eq!(probe.call().unwrap(), ProbeResult::returned(true, 0));
    }

    #[test]
    fn test_until_probe_mismatch() {
        let mut probe = UntilProbe::new(|| 0, 1);
        assert_eq!(probe.call().unwrap(), ProbeResult::returned(false, 0));
    }

    #[test]
    fn test_until_probe_matcher() {
        let mut probe = UntilProbe::matching(|| "  svc\n".to_string(), |s: &String| s.trim() == "svc");
        assert!(probe.call().unwrap().success);
    }

    #[test]
    fn test_catching_probe_pattern_match() {
        let mut probe =
            CatchingProbe::with_pattern(|| Err::<(), _>(TestError::Key("boom".into())), is_key, "oo")
                .unwrap();
        let result = probe.call().unwrap();
        assert!(result.success);
        assert_eq!(result.raised_error(), Some(&TestError::Key("boom".into())));
    }

    #[test]
    fn test_catching_probe_pattern_mismatch() {
        let mut probe =
            CatchingProbe::with_pattern(|| Err::<(), _>(TestError::Key("boom".into())), is_key, "zzz")
                .unwrap();
        let result = probe.call().unwrap();
        assert!(!result.success);
        assert_eq!(result.raised_error(), Some(&TestError::Key("boom".into())));
    }

    #[test]
    fn test_catching_probe_empty_pattern_is_failure() {
        let mut probe =
            CatchingProbe::with_pattern(|| Err::<(), _>(TestError::Key(String::new())), is_key, "")
                .unwrap();
        let result = probe.call().unwrap();
        assert!(!result.success);
        assert!(result.raised_error().is_some());
    }

    #[test]
    fn test_catching_probe_success_with_returned() {
        let mut probe =
            CatchingProbe::with_pattern(|| Ok::<_, TestError>("test"), is_key, "").unwrap();
        assert_eq!(probe.call().unwrap(), ProbeResult::returned(true, "test"));
    }

    #[test]
    fn test_catching_probe_uncaught() {
        let mut probe =
            CatchingProbe::with_pattern(|| Err::<(), _>(TestError::Key("boom".into())), is_value, "")
                .unwrap();
        assert_eq!(probe.call().unwrap_err(), TestError::Key("boom".into()));
    }

    #[test]
    fn test_catching_probe_invalid_pattern() {
        let probe = CatchingProbe::with_pattern(|| Ok::<(), TestError>(()), is_key, "(");
        assert!(probe.is_err());
    }
}
