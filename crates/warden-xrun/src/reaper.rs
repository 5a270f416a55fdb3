//! Cleanup after the supervisor dies.
//!
//! The supervisor starts `warden-xrun reap` in its own process group before
//! it starts the container. The reaper waits for the supervisor's pid to
//! disappear, however that happens, then kills what is left of the
//! supervisor's process group and removes the container.

use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use warden_core::retry::{Poller, Sleeper, ThreadSleeper, UntilProbe, retry};
use warden_process::{GroupSignal, group_exists, is_alive, signal_group};

use crate::error::{CommandError, Result, XrunError};
use crate::runtime::ContainerRuntime;

/// Default number of container removal attempts.
pub const DEFAULT_REMOVE_TRIES: u32 = 10;

/// Default grace period between SIGTERM and SIGKILL for the group.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Delay between liveness checks of the supervisor.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

const GROUP_POLL: Duration = Duration::from_millis(100);

/// Waits for a supervisor to die and cleans up after it.
pub struct Reaper {
    runtime: Arc<dyn ContainerRuntime>,
    pid: u32,
    pgid: Option<u32>,
    name: String,
    interval: Duration,
    grace: Duration,
    remove_tries: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl Reaper {
    /// Creates a reaper for supervisor `pid` and container `name`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, pid: u32, name: impl Into<String>) -> Self {
        Self {
            runtime,
            pid,
            pgid: None,
            name: name.into(),
            interval: DEFAULT_INTERVAL,
            grace: DEFAULT_GRACE,
            remove_tries: DEFAULT_REMOVE_TRIES,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Process group to kill once the supervisor is gone.
    #[must_use]
    pub fn with_pgid(mut self, pgid: Option<u32>) -> Self {
        self.pgid = pgid;
        self
    }

    /// Delay between liveness checks and between removal attempts.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Number of container removal attempts.
    #[must_use]
    pub fn with_remove_tries(mut self, tries: u32) -> Self {
        self.remove_tries = tries;
        self
    }

    /// Replaces the sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Waits for the supervisor, kills its group and removes the container.
    ///
    /// A failure to kill the group is logged; removal is attempted anyway.
    ///
    /// # Errors
    /// Returns the last removal failure.
    pub fn run(&self) -> Result<()> {
        tracing::info!(pid = self.pid, name = %self.name, "waiting for supervisor");
        self.wait_for_supervisor();
        tracing::info!(pid = self.pid, name = %self.name, "supervisor gone, cleaning up");

        if let Some(pgid) = self.pgid {
            if let Err(e) = self.kill_group(pgid) {
                tracing::warn!(pgid, error = %e, "failed to kill supervisor group");
            }
        }
        self.remove_container()
    }

    /// Blocks until the supervisor pid is no longer alive.
    pub fn wait_for_supervisor(&self) {
        while is_alive(self.pid) {
            self.sleeper.sleep(self.interval);
        }
    }

    /// Sends SIGTERM to `pgid`, then SIGKILL if members outlive the grace
    /// period.
    ///
    /// # Errors
    /// Returns a signal delivery failure.
    pub fn kill_group(&self, pgid: u32) -> Result<()> {
        if !signal_group(pgid, GroupSignal::Terminate)? {
            return Ok(());
        }

        let poller = Poller::within(self.grace, GROUP_POLL).with_sleeper(Arc::clone(&self.sleeper));
        let mut gone = UntilProbe::new(|| group_exists(pgid), false);
        if poller.check(&mut gone).is_err() {
            tracing::warn!(pgid, "process group survived SIGTERM, killing");
            signal_group(pgid, GroupSignal::Kill)?;
        }
        Ok(())
    }

    /// Removes the container, retrying engine failures.
    ///
    /// # Errors
    /// Returns the last engine failure once the attempts run out, or at
    /// once if the engine cannot be started.
    pub fn remove_container(&self) -> Result<()> {
        let removed = retry(|| self.runtime.remove(&self.name))
            .tries(self.remove_tries)
            .delay(self.interval)
            .sleeper(Arc::clone(&self.sleeper))
            .catching(CommandError::is_failed, "");

        match removed {
            Ok(_) => Ok(()),
            Err(e) => Err(e
                .into_raised()
                .map_or_else(|| XrunError::NotRemoved(self.name.clone()), XrunError::Command)),
        }
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("pid", &self.pid)
            .field("pgid", &self.pgid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Starts `warden-xrun reap` for the current process and container `name`.
///
/// The reaper runs in a process group of its own so that killing the
/// supervisor's group does not take it down. The group is only handed over
/// for killing when this process leads it.
///
/// # Errors
/// Returns an error if the current executable cannot be located or started.
pub fn spawn_reaper(docker: &str, name: &str) -> std::io::Result<Child> {
    let mut command = Command::new(std::env::current_exe()?);
    command
        .args(["--docker", docker, "reap", "--name", name])
        .args(["--pid", &std::process::id().to_string()])
        .stdin(Stdio::null());
    if let Some(pgid) = leading_group() {
        command.args(["--pgid", &pgid.to_string()]);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn()?;
    tracing::debug!(pid = child.id(), name, "spawned reaper");
    Ok(child)
}

/// The current process group id, if this process leads it.
#[cfg(unix)]
#[must_use]
pub fn leading_group() -> Option<u32> {
    use nix::unistd::{getpgrp, getpid};

    let pid = getpid();
    if getpgrp() == pid {
        u32::try_from(pid.as_raw()).ok()
    } else {
        None
    }
}

/// The current process group id, if this process leads it.
#[cfg(not(unix))]
#[must_use]
pub fn leading_group() -> Option<u32> {
    None
}
