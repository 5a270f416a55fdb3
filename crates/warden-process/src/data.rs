//! Resource descriptions produced by a preparation step.

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;

use crate::error::{ProcessError, Result};

/// How to launch a resource and how to tell that it is ready.
#[derive(Debug, Clone)]
pub struct ProcessData {
    pattern: Regex,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl ProcessData {
    /// Describes a resource launched with `args` and ready once a line of its
    /// output matches `pattern`.
    ///
    /// # Errors
    /// Returns a configuration error if `pattern` is not a valid regex or
    /// `args` is empty.
    pub fn new<I, S>(pattern: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = Regex::new(pattern)
            .map_err(|e| ProcessError::config(format!("invalid readiness pattern: {e}")))?;
        Self::with_regex(pattern, args)
    }

    /// Like [`ProcessData::new`] with an already compiled pattern.
    ///
    /// # Errors
    /// Returns a configuration error if `args` is empty.
    pub fn with_regex<I, S>(pattern: Regex, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if args.is_empty() {
            return Err(ProcessError::config("command cannot be empty"));
        }
        Ok(Self {
            pattern,
            args,
            env: HashMap::new(),
            timeout: None,
        })
    }

    /// Adds an environment variable for the launched process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Overrides the configured readiness timeout for this resource.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The readiness pattern.
    #[must_use]
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Program followed by its arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables.
    #[must_use]
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Per-resource timeout, if set.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns true if any line of `output` matches the readiness pattern.
    #[must_use]
    pub fn is_ready(&self, output: &str) -> bool {
        output.lines().any(|line| self.pattern.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_data_new() {
        let data = ProcessData::new("Ready!", ["sh", "-c", "echo Ready!"]).unwrap();
        assert_eq!(data.args(), ["sh", "-c", "echo Ready!"]);
        assert_eq!(data.pattern().as_str(), "Ready!");
        assert!(data.env().is_empty());
        assert_eq!(data.timeout(), None);
    }

    #[test]
    fn test_process_data_builders() {
        let data = ProcessData::new("listening", vec!["nc".to_string()])
            .unwrap()
            .with_env("PORT", "4444")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(data.env().get("PORT").map(String::as_str), Some("4444"));
        assert_eq!(data.timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_process_data_rejects_empty_command() {
        let args: [&str; 0] = [];
        assert!(ProcessData::new("x", args).is_err());
    }

    #[test]
    fn test_process_data_rejects_invalid_pattern() {
        let err = ProcessData::new("(", ["true"]).unwrap_err();
        assert!(err.to_string().contains("invalid readiness pattern"));
    }

    #[test]
    fn test_process_data_is_ready() {
        let data = ProcessData::new("^Ready", ["true"]).unwrap();
        assert!(!data.is_ready(""));
        assert!(!data.is_ready("Booting...\nNot Ready"));
        assert!(data.is_ready("Booting...\nReady!\n"));
    }
}
