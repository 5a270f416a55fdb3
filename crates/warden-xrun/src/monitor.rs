//! Supervision loop over a running container.
//!
//! ```text
//!             follow ends / fails
//!  Following ─────────────────────▶ Checking ──── no status ────▶ Stopped
//!      ▲                              │  ▲
//!      └────────── running ───────────┘  └── present, not running (sleep)
//! ```

use std::sync::Arc;
use std::time::Duration;

use warden_core::retry::{Sleeper, ThreadSleeper};

use crate::error::CommandError;
use crate::runtime::ContainerRuntime;

/// Default delay between status checks of a stopped container.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Supervision state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Tailing the container's output.
    Following,
    /// Querying the container's status.
    Checking,
    /// The container is gone; terminal.
    Stopped,
}

/// Follows a container's output until the container no longer exists.
pub struct Monitor {
    runtime: Arc<dyn ContainerRuntime>,
    name: String,
    interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Monitor {
    /// Creates a monitor for the container `name`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, name: impl Into<String>) -> Self {
        Self {
            runtime,
            name: name.into(),
            interval: DEFAULT_INTERVAL,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Sets the delay between checks of a container that exists but is not
    /// running.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replaces the sleeper used between checks.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Runs the loop until [`MonitorState::Stopped`].
    ///
    /// # Errors
    /// Returns the first status query failure, or a follow failure other
    /// than the command exiting unsuccessfully.
    pub fn run(&self) -> Result<(), CommandError> {
        let mut state = MonitorState::Following;
        while state != MonitorState::Stopped {
            state = self.step(state)?;
        }
        tracing::info!(name = %self.name, "container stopped");
        Ok(())
    }

    /// Performs one transition.
    ///
    /// # Errors
    /// Same as [`Monitor::run`].
    pub fn step(&self, state: MonitorState) -> Result<MonitorState, CommandError> {
        match state {
            MonitorState::Following => match self.runtime.follow(&self.name) {
                Ok(()) => Ok(MonitorState::Checking),
                // Expected while the container restarts.
                Err(e @ CommandError::Failed { .. }) => {
                    tracing::debug!(name = %self.name, error = %e, "follow interrupted");
                    Ok(MonitorState::Checking)
                }
                Err(e) => Err(e),
            },
            MonitorState::Checking => match self.runtime.status(&self.name)? {
                None => Ok(MonitorState::Stopped),
                Some(status) if status.running => Ok(MonitorState::Following),
                Some(status) => {
                    tracing::debug!(name = %self.name, status = %status.status, "waiting for container");
                    self.sleeper.sleep(self.interval);
                    Ok(MonitorState::Checking)
                }
            },
            MonitorState::Stopped => Ok(MonitorState::Stopped),
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::runtime::ContainerStatus;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::retry::RecordingSleeper;

    type Scripted<T> = Mutex<VecDeque<Result<T, CommandError>>>;

    /// Runtime answering from pre-recorded queues.
    ///
    /// An exhausted `status` queue reports the container as gone; an
    /// exhausted `follow` queue returns immediately.
    #[derive(Default)]
    pub(crate) struct ScriptedRuntime {
        pub follows: Scripted<()>,
        pub statuses: Scripted<Option<ContainerStatus>>,
        pub removals: Scripted<()>,
        pub follow_calls: AtomicUsize,
        pub status_calls: AtomicUsize,
        pub remove_calls: AtomicUsize,
        pub run_args: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRuntime {
        pub fn follow_then(self, result: Result<(), CommandError>) -> Self {
            self.follows.lock().push_back(result);
            self
        }

        pub fn status_then(self, result: Result<Option<ContainerStatus>, CommandError>) -> Self {
            self.statuses.lock().push_back(result);
            self
        }

        pub fn remove_then(self, result: Result<(), CommandError>) -> Self {
            self.removals.lock().push_back(result);
            self
        }
    }

    impl ContainerRuntime for ScriptedRuntime {
        fn status(&self, _name: &str) -> Result<Option<ContainerStatus>, CommandError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.statuses.lock().pop_front().unwrap_or(Ok(None))
        }

        fn follow(&self, _name: &str) -> Result<(), CommandError> {
            self.follow_calls.fetch_add(1, Ordering::SeqCst);
            self.follows.lock().pop_front().unwrap_or(Ok(()))
        }

        fn run_detached(&self, args: &[String]) -> Result<Option<String>, CommandError> {
            self.run_args.lock().push(args.to_vec());
            Ok(Some("0123abcd".into()))
        }

        fn remove(&self, _name: &str) -> Result<(), CommandError> {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            self.removals.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    pub(crate) fn running() -> Option<ContainerStatus> {
        Some(ContainerStatus {
            status: "running".into(),
            running: true,
        })
    }

    pub(crate) fn exited() -> Option<ContainerStatus> {
        Some(ContainerStatus {
            status: "exited".into(),
            running: false,
        })
    }

    pub(crate) fn follow_failed() -> CommandError {
        CommandError::Failed {
            command: "docker logs --follow svc".into(),
            code: Some(1),
            output: String::new(),
        }
    }

    fn monitor(runtime: &Arc<ScriptedRuntime>, sleeper: &Arc<RecordingSleeper>) -> Monitor {
        Monitor::new(Arc::clone(runtime) as Arc<dyn ContainerRuntime>, "svc")
            .with_interval(Duration::ZERO)
            .with_sleeper(Arc::clone(sleeper) as Arc<dyn Sleeper>)
    }

    #[test]
    fn test_normal_exit() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let sleeper = Arc::new(RecordingSleeper::new());

        monitor(&runtime, &sleeper).run().unwrap();

        assert_eq!(runtime.follow_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sleeper.call_count(), 0);
    }

    #[test]
    fn test_follow_error_resumes_while_running() {
        let runtime = Arc::new(
            ScriptedRuntime::default()
                .follow_then(Err(follow_failed()))
                .status_then(Ok(running()))
                .status_then(Ok(None)),
        );
        let sleeper = Arc::new(RecordingSleeper::new());

        monitor(&runtime, &sleeper).run().unwrap();

        assert_eq!(runtime.follow_calls.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.status_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_spawn_error_propagates() {
        let runtime = Arc::new(ScriptedRuntime::default().follow_then(Err(CommandError::spawn(
            "docker",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ))));
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = monitor(&runtime, &sleeper).run().unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert_eq!(runtime.status_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_status_error_propagates() {
        let runtime = Arc::new(ScriptedRuntime::default().status_then(Err(follow_failed())));
        let sleeper = Arc::new(RecordingSleeper::new());

        assert!(monitor(&runtime, &sleeper).run().unwrap_err().is_failed());
    }

    #[test]
    fn test_stopped_container_is_rechecked() {
        let runtime = Arc::new(
            ScriptedRuntime::default()
                .status_then(Ok(exited()))
                .status_then(Ok(exited()))
                .status_then(Ok(None)),
        );
        let sleeper = Arc::new(RecordingSleeper::new());

        monitor(&runtime, &sleeper)
            .with_interval(Duration::from_millis(250))
            .run()
            .unwrap();

        assert_eq!(runtime.follow_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.status_calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.durations(), [Duration::from_millis(250); 2]);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let sleeper = Arc::new(RecordingSleeper::new());
        let monitor = monitor(&runtime, &sleeper);

        assert_eq!(monitor.step(MonitorState::Stopped).unwrap(), MonitorState::Stopped);
        assert_eq!(runtime.follow_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.status_calls.load(Ordering::SeqCst), 0);
    }
}
