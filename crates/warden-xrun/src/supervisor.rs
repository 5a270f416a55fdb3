//! Foreground supervision of a detached container.
//!
//! The container runs detached so that the engine, not this process, owns
//! it; this process follows it with a [`Monitor`] and removes it when asked
//! to stop by a signal. Abrupt deaths are handled by the reaper.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, XrunError};
use crate::monitor::Monitor;
use crate::runtime::ContainerRuntime;

/// Exit status reported for a signal: `128 + signum`, as shells do.
#[must_use]
pub const fn signal_exit_code(signum: i32) -> i32 {
    128 + signum
}

/// Termination signals the supervisor reacts to.
///
/// Handlers are installed on creation, before the container starts, so an
/// early signal is not lost to the default action.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Installs handlers for SIGINT, SIGTERM and SIGHUP.
    ///
    /// # Errors
    /// Returns [`XrunError::Signal`] if a handler cannot be installed.
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).map_err(XrunError::Signal)?,
            terminate: signal(SignalKind::terminate()).map_err(XrunError::Signal)?,
            hangup: signal(SignalKind::hangup()).map_err(XrunError::Signal)?,
        })
    }

    /// Installs a Ctrl-C handler.
    ///
    /// # Errors
    /// Never fails on this platform.
    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next signal and returns its number.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> i32 {
        use nix::sys::signal::Signal;

        let signal = tokio::select! {
            _ = self.interrupt.recv() => Signal::SIGINT,
            _ = self.terminate.recv() => Signal::SIGTERM,
            _ = self.hangup.recv() => Signal::SIGHUP,
        };
        signal as i32
    }

    /// Waits for Ctrl-C and returns SIGINT's number.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> i32 {
        let _ = tokio::signal::ctrl_c().await;
        2
    }
}

impl std::fmt::Debug for ShutdownSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignals").finish_non_exhaustive()
    }
}

/// Supervises one container from start to removal.
pub struct Supervisor {
    runtime: Arc<dyn ContainerRuntime>,
    name: String,
    interval: Duration,
}

impl Supervisor {
    /// Creates a supervisor for the container `name`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, name: impl Into<String>) -> Self {
        Self {
            runtime,
            name: name.into(),
            interval: crate::monitor::DEFAULT_INTERVAL,
        }
    }

    /// Sets the monitor's check interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts the container from `args` and follows it.
    ///
    /// A name already in use is adopted: the existing container is followed.
    /// Returns `0` when the container is gone, or `128 + signum` after a
    /// signal, in which case the container has been removed.
    ///
    /// # Errors
    /// Returns engine failures from starting, following or removing the
    /// container.
    pub async fn run(self, args: Vec<String>, mut signals: ShutdownSignals) -> Result<i32> {
        let runtime = Arc::clone(&self.runtime);
        match blocking(move || runtime.run_detached(&args)).await?? {
            Some(id) => tracing::info!(name = %self.name, id = %id, "container started"),
            None => tracing::warn!(name = %self.name, "container already exists, following it"),
        }

        let monitor = Monitor::new(Arc::clone(&self.runtime), self.name.clone())
            .with_interval(self.interval);
        let following = blocking(move || monitor.run());

        tokio::select! {
            joined = following => {
                joined??;
                Ok(0)
            }
            signum = signals.recv() => {
                tracing::info!(name = %self.name, signum, "signalled, removing container");
                let runtime = Arc::clone(&self.runtime);
                let name = self.name.clone();
                blocking(move || runtime.remove(&name)).await??;
                Ok(signal_exit_code(signum))
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Runs a blocking engine call off the async workers.
async fn blocking<T, F>(func: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(func)
        .await
        .map_err(XrunError::task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::{ScriptedRuntime, follow_failed};
    use std::sync::atomic::Ordering;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_signal_exit_code() {
        assert_eq!(signal_exit_code(15), 143);
        assert_eq!(signal_exit_code(2), 130);
    }

    #[tokio::test]
    async fn test_run_until_container_gone() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let signals = ShutdownSignals::install().unwrap();

        let code = Supervisor::new(Arc::clone(&runtime) as Arc<dyn ContainerRuntime>, "svc")
            .with_interval(Duration::ZERO)
            .run(strings(&["--name", "svc", "alpine"]), signals)
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(*runtime.run_args.lock(), [strings(&["--name", "svc", "alpine"])]);
        assert_eq!(runtime.follow_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.remove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_propagates_status_failure() {
        let runtime = Arc::new(ScriptedRuntime::default().status_then(Err(follow_failed())));
        let signals = ShutdownSignals::install().unwrap();

        let err = Supervisor::new(Arc::clone(&runtime) as Arc<dyn ContainerRuntime>, "svc")
            .run(strings(&["alpine"]), signals)
            .await
            .unwrap_err();

        assert!(matches!(err, XrunError::Command(_)));
    }
}
