//! Error types for warden-xrun.

use warden_process::ProcessError;

/// Result type alias for the supervisor.
pub type Result<T> = std::result::Result<T, XrunError>;

/// Failure of a one-shot external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command ran and exited unsuccessfully.
    #[error("`{command}` failed (exit code {code:?})")]
    Failed {
        /// Command line, space separated.
        command: String,
        /// Exit code, if the command exited normally.
        code: Option<i32>,
        /// Captured stdout followed by stderr.
        output: String,
    },

    /// The command could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Returns true if the command ran and failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Captured output of a failed command.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. } => Some(output),
            Self::Spawn { .. } => None,
        }
    }

    /// Returns true if the captured output contains `needle`, ignoring
    /// ASCII case.
    ///
    /// Engines disagree on capitalisation: Docker says "No such object",
    /// Podman "no such object".
    #[must_use]
    pub fn output_contains(&self, needle: &str) -> bool {
        self.output().is_some_and(|output| {
            output
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase())
        })
    }
}

/// Supervisor and reaper failures.
#[derive(Debug, thiserror::Error)]
pub enum XrunError {
    /// A container engine command failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The container arguments ask for detached mode.
    #[error("Cannot pass --detach")]
    Detach,

    /// The container could still not be removed after every attempt.
    #[error("container {0} was not removed")]
    NotRemoved(String),

    /// Signal handlers could not be installed.
    #[error("signal handler error: {0}")]
    Signal(#[source] std::io::Error),

    /// A blocking supervisor task panicked or was cancelled.
    #[error("supervisor task failed: {0}")]
    Task(String),

    /// Process signalling failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl XrunError {
    /// Creates a task error.
    #[must_use]
    pub fn task(msg: impl std::fmt::Display) -> Self {
        Self::Task(msg.to_string())
    }
}
