//! Error types for warden-process.

use std::time::Duration;

use warden_core::{CacheError, LockError};

/// Result type alias for process coordination.
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Failure modes of launching and supervising a background process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Lock acquisition or release failed.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Cache read or write failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Invalid configuration or resource description.
    #[error("configuration error: {0}")]
    Config(String),

    /// The command could not be started.
    #[error("failed to launch {name}: {source}")]
    Launch {
        /// Resource name.
        name: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The readiness pattern was not seen in time.
    #[error("{name} not ready after {}", humantime::format_duration(*timeout))]
    Timeout {
        /// Resource name.
        name: String,
        /// Bound that elapsed.
        timeout: Duration,
        /// Output captured while booting.
        output: String,
    },

    /// The process exited before printing its readiness pattern.
    #[error("{name} exited before becoming ready (exit code {code:?})")]
    Exited {
        /// Resource name.
        name: String,
        /// Exit code, if it exited normally.
        code: Option<i32>,
        /// Output captured while booting.
        output: String,
    },

    /// No process has been launched under this name.
    #[error("process not found: {0}")]
    NotFound(String),

    /// Sending a signal failed.
    #[error("signal error: {0}")]
    Signal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a signal error.
    #[must_use]
    pub fn signal(msg: impl Into<String>) -> Self {
        Self::Signal(msg.into())
    }

    /// Creates a launch error.
    #[must_use]
    pub fn launch(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            name: name.into(),
            source,
        }
    }

    /// Returns true for a readiness timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the boot output attached to a timeout or early exit.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Timeout { output, .. } | Self::Exited { output, .. } => Some(output),
            _ => None,
        }
    }
}
