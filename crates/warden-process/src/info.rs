//! Handles to launched processes and process-group signalling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::retry::{Poller, UntilProbe};

use crate::error::{ProcessError, Result};

/// Delay between liveness checks while waiting for a terminated process.
const TERMINATE_POLL: Duration = Duration::from_millis(50);

/// Handle to a launched resource.
///
/// The process was started as the leader of its own process group, so
/// signals sent through this handle reach every process it spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Resource name.
    pub name: String,
    /// OS process id of the launched command (also its process group id).
    pub pid: u32,
    /// File receiving the command's stdout and stderr.
    pub log_path: PathBuf,
    /// Grace period between SIGTERM and SIGKILL.
    #[serde(skip, default = "default_terminate_timeout")]
    pub terminate_timeout: Duration,
}

fn default_terminate_timeout() -> Duration {
    Duration::from_secs(10)
}

impl ProcessInfo {
    /// Creates a handle.
    #[must_use]
    pub fn new(name: impl Into<String>, pid: u32, log_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            pid,
            log_path: log_path.into(),
            terminate_timeout: default_terminate_timeout(),
        }
    }

    /// Sets the SIGTERM to SIGKILL grace period.
    #[must_use]
    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// Returns true while the process exists and is not a zombie.
    #[must_use]
    pub fn is_running(&self) -> bool {
        is_alive(self.pid)
    }

    /// Stops the process group: SIGTERM, then SIGKILL if any member is
    /// still alive once the grace period elapses. Succeeds if the group is
    /// already gone.
    ///
    /// Members that ignore SIGTERM are killed even after the leader exited.
    pub fn terminate(&self) -> Result<()> {
        if !signal_group(self.pid, GroupSignal::Terminate)? {
            tracing::debug!(name = %self.name, pid = self.pid, "process group already gone");
            return Ok(());
        }

        let poller = Poller::within(self.terminate_timeout, TERMINATE_POLL);
        let mut stopped = UntilProbe::new(|| group_exists(self.pid), false);
        if poller.check(&mut stopped).is_ok() {
            tracing::info!(name = %self.name, pid = self.pid, "terminated");
            return Ok(());
        }

        tracing::warn!(
            name = %self.name,
            pid = self.pid,
            grace = %humantime::format_duration(self.terminate_timeout),
            "process group outlived SIGTERM, sending SIGKILL"
        );
        self.kill()
    }

    /// Sends SIGKILL to the process group.
    pub fn kill(&self) -> Result<()> {
        signal_group(self.pid, GroupSignal::Kill)?;
        Ok(())
    }

    /// Reads everything the process has written so far.
    pub fn read_log(&self) -> Result<String> {
        read_log(&self.log_path)
    }
}

/// Reads a log file, replacing invalid UTF-8.
pub(crate) fn read_log(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// =============================================================================
// Signals and liveness
// =============================================================================

/// Signal sent to a whole process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// SIGTERM: ask politely.
    Terminate,
    /// SIGKILL: cannot be ignored.
    Kill,
}

/// Sends `sig` to the process group led by `pgid`.
///
/// Returns `Ok(false)` if no such group exists.
///
/// # Errors
/// Returns [`ProcessError::Signal`] if the id is out of range or the signal
/// cannot be delivered.
#[cfg(unix)]
pub fn signal_group(pgid: u32, sig: GroupSignal) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};

    let group = to_pid(pgid)?;
    let signal = match sig {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };

    match killpg(group, signal) {
        Ok(()) => {
            tracing::debug!(pgid, signal = signal.as_str(), "signalled process group");
            Ok(true)
        }
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(ProcessError::signal(format!(
            "killpg({pgid}, {}) failed: {e}",
            signal.as_str()
        ))),
    }
}

/// Sends `sig` to the process group led by `pgid`.
#[cfg(not(unix))]
pub fn signal_group(pgid: u32, sig: GroupSignal) -> Result<bool> {
    let _ = (pgid, sig);
    Err(ProcessError::signal("process groups are not supported on this platform"))
}

/// Returns true if at least one live process is still a member of group
/// `pgid`.
///
/// On Linux, members that exited but were not reaped yet are ignored.
/// Elsewhere they still count.
#[cfg(unix)]
#[must_use]
pub fn group_exists(pgid: u32) -> bool {
    let exists = to_pid(pgid).is_ok_and(|group| nix::sys::signal::killpg(group, None).is_ok());
    if !exists {
        return false;
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(live) = live_group_member(pgid) {
            return live;
        }
    }

    true
}

/// Scans `/proc` for a non-zombie member of group `pgid`.
///
/// Returns `None` if `/proc` cannot be listed.
#[cfg(target_os = "linux")]
fn live_group_member(pgid: u32) -> Option<bool> {
    let entries = std::fs::read_dir("/proc").ok()?;
    let live = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.bytes().all(|b| b.is_ascii_digit()))
        })
        .filter_map(|entry| std::fs::read_to_string(entry.path().join("stat")).ok())
        .filter_map(|stat| stat_state_and_group(&stat))
        .any(|(state, group)| group == pgid && !is_dead_state(state));
    Some(live)
}

/// Returns true if at least one process is still a member of group `pgid`.
#[cfg(not(unix))]
#[must_use]
pub fn group_exists(pgid: u32) -> bool {
    let _ = pgid;
    false
}

/// Returns true if `pid` exists and is not a zombie.
///
/// A child that exited but was not yet reaped still answers `kill(pid, 0)`,
/// so on Linux the state letter in `/proc/<pid>/status` is consulted too.
/// Stopped and traced processes are alive: they resume on SIGCONT.
#[cfg(unix)]
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;

    let Ok(target) = to_pid(pid) else {
        return false;
    };
    if kill(target, None).is_err() {
        return false;
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{pid}/status")) {
            if let Some(state) = proc_state(&status) {
                return !is_dead_state(state);
            }
        }
    }

    true
}

/// Returns true if `pid` exists.
#[cfg(not(unix))]
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let _ = pid;
    false
}

/// Reaps `pid` if it is an exited child of this process.
///
/// Launched resources are detached from their [`std::process::Child`], so an
/// exited one stays a zombie until collected here. Returns true if an exit
/// status was collected.
#[cfg(unix)]
pub fn reap_exited(pid: u32) -> bool {
    use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};

    let Ok(target) = to_pid(pid) else {
        return false;
    };
    match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) => {
            tracing::debug!(pid, "reaped exited process");
            true
        }
        // Not our child, or still running.
        _ => false,
    }
}

/// Reaps `pid` if it is an exited child of this process.
#[cfg(not(unix))]
pub fn reap_exited(pid: u32) -> bool {
    let _ = pid;
    false
}

/// Zombie or dead state letters from `/proc`.
#[cfg(any(target_os = "linux", test))]
const fn is_dead_state(state: char) -> bool {
    matches!(state, 'Z' | 'X' | 'x')
}

/// Extracts the state letter and process group from `/proc/<pid>/stat`.
///
/// The command name is parenthesised and may itself contain `)`, so fields
/// are counted from the last one.
#[cfg(any(target_os = "linux", test))]
fn stat_state_and_group(stat: &str) -> Option<(char, u32)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let group = fields.next()?.parse().ok()?;
    Some((state, group))
}

/// Extracts the state letter from the contents of `/proc/<pid>/status`.
#[cfg(any(target_os = "linux", test))]
fn proc_state(status: &str) -> Option<char> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("State:"))
        .and_then(|rest| rest.trim_start().chars().next())
}

#[cfg(unix)]
fn to_pid(pid: u32) -> Result<nix::unistd::Pid> {
    // 0 and negative values address groups or "everything"; never valid here.
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(nix::unistd::Pid::from_raw(raw)),
        _ => Err(ProcessError::signal(format!("invalid pid: {pid}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proc_state() {
        let status = "Name:\tsleep\nUmask:\t0022\nState:\tZ (zombie)\nTgid:\t42\n";
        assert_eq!(proc_state(status), Some('Z'));
        assert_eq!(proc_state("State:\tS (sleeping)\n"), Some('S'));
        assert_eq!(proc_state("Name:\tx\n"), None);
    }

    #[test]
    fn test_stat_state_and_group() {
        let stat = "4242 (sleep) S 4241 4240 4240 0 -1 4194304 97 0 0 0";
        assert_eq!(stat_state_and_group(stat), Some(('S', 4240)));

        let odd = "77 (a) b (c)) Z 1 70 70 0";
        assert_eq!(stat_state_and_group(odd), Some(('Z', 70)));
        assert_eq!(stat_state_and_group("77 (x"), None);
        assert_eq!(stat_state_and_group("77 (x) R 1"), None);
    }

    #[test]
    fn test_stopped_state_is_alive() {
        assert!(!is_dead_state('T'));
        assert!(!is_dead_state('t'));
        assert!(!is_dead_state('S'));
        assert!(is_dead_state('Z'));
        assert!(is_dead_state('X'));
    }

    #[test]
    fn test_info_serde_skips_grace_period() {
        let info = ProcessInfo::new("svc", 42, "/tmp/svc/process.log")
            .with_terminate_timeout(Duration::from_secs(1));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["pid"], 42);
        assert!(json.get("terminate_timeout").is_none());

        let back: ProcessInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back.terminate_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_read_log_missing() {
        let info = ProcessInfo::new("svc", 42, "/nonexistent/warden/process.log");
        assert!(matches!(info.read_log(), Err(ProcessError::Io(_))));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::process::CommandExt;
        use std::process::{Child, Command};

        fn spawn_group(script: &str) -> Child {
            Command::new("sh")
                .args(["-c", script])
                .process_group(0)
                .spawn()
                .unwrap()
        }

        #[test]
        fn test_is_alive_current_process() {
            assert!(is_alive(std::process::id()));
        }

        #[test]
        fn test_is_alive_invalid_pid() {
            assert!(!is_alive(0));
            assert!(!is_alive(u32::MAX));
        }

        #[test]
        fn test_signal_group_invalid_pid() {
            assert!(signal_group(0, GroupSignal::Terminate).is_err());
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn test_zombie_is_not_alive() {
            let child = spawn_group("exit 0");
            let pid = child.id();

            // Not reaped: the child lingers as a zombie.
            let poller = Poller::within(Duration::from_secs(5), Duration::from_millis(10));
            let mut dead = UntilProbe::new(|| is_alive(pid), false);
            assert!(poller.check(&mut dead).is_ok());
            drop(child);
        }

        #[test]
        fn test_terminate_group() {
            let mut child = spawn_group("sleep 30 & wait");
            let info = ProcessInfo::new("sleeper", child.id(), "/dev/null");
            assert!(info.is_running());

            info.terminate().unwrap();
            child.wait().unwrap();
            assert!(!info.is_running());
        }

        #[test]
        fn test_terminate_escalates_to_kill() {
            let mut child = spawn_group("trap '' TERM; while true; do sleep 0.05; done");
            let info = ProcessInfo::new("stubborn", child.id(), "/dev/null")
                .with_terminate_timeout(Duration::from_millis(200));
            std::thread::sleep(Duration::from_millis(100));

            info.terminate().unwrap();
            let status = child.wait().unwrap();
            assert!(!status.success());
        }

        #[test]
        fn test_group_exists() {
            let mut child = spawn_group("sleep 30");
            let pgid = child.id();
            assert!(group_exists(pgid));

            assert!(signal_group(pgid, GroupSignal::Kill).unwrap());
            child.wait().unwrap();
            assert!(!group_exists(pgid));
            assert!(!group_exists(0));
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn test_stopped_process_is_alive() {
            use nix::sys::signal::{Signal, kill};

            let mut child = spawn_group("sleep 30");
            let pid = child.id();
            let target = to_pid(pid).unwrap();
            kill(target, Signal::SIGSTOP).unwrap();

            let poller = Poller::within(Duration::from_secs(5), Duration::from_millis(10));
            let mut stopped = UntilProbe::matching(
                || {
                    std::fs::read_to_string(format!("/proc/{pid}/status"))
                        .ok()
                        .and_then(|status| proc_state(&status))
                },
                |state| *state == Some('T'),
            );
            assert!(poller.check(&mut stopped).is_ok());
            assert!(is_alive(pid));
            assert!(group_exists(pid));

            // SIGKILL ends a stopped process too.
            let info = ProcessInfo::new("stopped", pid, "/dev/null")
                .with_terminate_timeout(Duration::from_millis(200));
            info.terminate().unwrap();
            assert!(!child.wait().unwrap().success());
        }

        #[test]
        fn test_terminate_kills_members_ignoring_sigterm() {
            let dir = tempfile::tempdir().unwrap();
            let pid_file = dir.path().join("member.pid");
            let script = format!(
                "sh -c \"trap '' TERM; while true; do sleep 0.05; done\" & echo $! > {}; wait",
                pid_file.display()
            );
            let mut child = spawn_group(&script);
            let info = ProcessInfo::new("leader", child.id(), "/dev/null")
                .with_terminate_timeout(Duration::from_millis(300));

            let poller = Poller::within(Duration::from_secs(5), Duration::from_millis(10));
            let mut written = UntilProbe::matching(
                || {
                    std::fs::read_to_string(&pid_file)
                        .ok()
                        .and_then(|raw| raw.trim().parse::<u32>().ok())
                },
                Option::is_some,
            );
            let member = poller
                .check(&mut written)
                .unwrap()
                .outcome
                .into_returned()
                .flatten()
                .unwrap();
            std::thread::sleep(Duration::from_millis(100));

            info.terminate().unwrap();
            child.wait().unwrap();

            let mut gone = UntilProbe::new(|| group_exists(member), false);
            assert!(poller.check(&mut gone).is_ok());
            let mut dead = UntilProbe::new(|| is_alive(member), false);
            assert!(poller.check(&mut dead).is_ok());
        }

        #[test]
        fn test_reap_exited() {
            let child = std::process::Command::new("true").spawn().unwrap();
            let pid = child.id();
            drop(child);

            let poller = Poller::within(Duration::from_secs(5), Duration::from_millis(10));
            let mut reaped = UntilProbe::new(|| reap_exited(pid), true);
            assert!(poller.check(&mut reaped).is_ok());
            // Already collected.
            assert!(!reap_exited(pid));
            assert!(!reap_exited(std::process::id()));
        }

        #[test]
        fn test_terminate_already_gone() {
            let mut child = spawn_group("exit 0");
            let pid = child.id();
            child.wait().unwrap();

            let info = ProcessInfo::new("gone", pid, "/dev/null");
            info.terminate().unwrap();
        }
    }
}
