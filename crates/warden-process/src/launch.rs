//! Launching a described command in the background and waiting for it.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use warden_core::retry::{Poller, UntilProbe};

use crate::data::ProcessData;
use crate::error::{ProcessError, Result};
use crate::info::{ProcessInfo, read_log};

/// Pid file name inside a resource directory.
pub const PID_FILE: &str = "process.pid";

/// Log file name inside a resource directory.
pub const LOG_FILE: &str = "process.log";

/// Lock file name inside a resource directory.
pub const LOCK_FILE: &str = "process.lock";

/// Where a launched process stands during boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    /// Still running, readiness pattern not seen yet.
    Booting,
    /// Readiness pattern seen.
    Ready,
    /// Exited without printing the pattern.
    Exited(Option<i32>),
}

/// A process started by [`launch`], not yet known to be ready.
#[derive(Debug)]
pub struct Launched {
    child: Child,
    info: ProcessInfo,
}

/// Starts `data` in `dir` as the leader of a new process group.
///
/// Stdout and stderr go to `<dir>/process.log` (truncated), stdin is closed,
/// and the pid is written to `<dir>/process.pid`.
///
/// # Errors
/// Returns [`ProcessError::Launch`] if the command cannot be spawned and
/// [`ProcessError::Io`] if the control files cannot be written.
pub fn launch(name: &str, dir: &Path, data: &ProcessData) -> Result<Launched> {
    std::fs::create_dir_all(dir)?;

    let log_path = dir.join(LOG_FILE);
    let log = File::create(&log_path)?;
    let stderr = log.try_clone()?;

    let (program, args) = data
        .args()
        .split_first()
        .ok_or_else(|| ProcessError::config("command cannot be empty"))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .envs(data.env())
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(stderr);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command
        .spawn()
        .map_err(|e| ProcessError::launch(name, e))?;
    let pid = child.id();
    std::fs::write(dir.join(PID_FILE), format!("{pid}\n"))?;

    tracing::info!(name, pid, command = ?data.args(), "launched");

    Ok(Launched {
        child,
        info: ProcessInfo::new(name, pid, log_path),
    })
}

/// Reads the pid recorded for the resource in `dir`.
///
/// # Errors
/// Returns [`ProcessError::NotFound`] if nothing was launched there.
pub fn read_pid(name: &str, dir: &Path) -> Result<u32> {
    let path = dir.join(PID_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProcessError::NotFound(name.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    content.trim().parse().map_err(|e| {
        ProcessError::config(format!("invalid pid file {}: {e}", path.display()))
    })
}

/// Log file of the resource in `dir`.
#[must_use]
pub fn log_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE)
}

impl Launched {
    /// The handle of the launched process.
    #[must_use]
    pub fn info(&self) -> &ProcessInfo {
        &self.info
    }

    /// Checks once whether the process became ready or exited.
    ///
    /// The exit status is sampled before the log is read, so a pattern
    /// printed just before exiting still counts as ready.
    pub fn boot_state(&mut self, data: &ProcessData) -> Result<BootState> {
        let exited = self.child.try_wait()?;
        let output = read_log(&self.info.log_path)?;

        if data.is_ready(&output) {
            return Ok(BootState::Ready);
        }
        Ok(match exited {
            Some(status) => BootState::Exited(status.code()),
            None => BootState::Booting,
        })
    }

    /// Polls until the process is ready, exits, or `timeout` elapses.
    ///
    /// Returns [`BootState::Booting`] on timeout.
    pub fn wait_ready(
        &mut self,
        data: &ProcessData,
        timeout: Duration,
        interval: Duration,
    ) -> Result<BootState> {
        let poller = Poller::within(timeout, interval);
        let mut probe = UntilProbe::matching(
            || self.boot_state(data),
            |state: &Result<BootState>| !matches!(state, Ok(BootState::Booting)),
        );

        match poller.check(&mut probe) {
            Ok(result) => result
                .outcome
                .into_returned()
                .unwrap_or(Ok(BootState::Booting)),
            Err(_) => Ok(BootState::Booting),
        }
    }

    /// Reaps the child if it already exited, so it does not linger as a
    /// zombie of this process.
    pub fn reap(&mut self) {
        if let Err(e) = self.child.try_wait() {
            tracing::debug!(name = %self.info.name, error = %e, "could not reap child");
        }
    }

    /// Gives up ownership of the child, leaving it running.
    #[must_use]
    pub fn detach(self) -> ProcessInfo {
        self.info
    }
}
