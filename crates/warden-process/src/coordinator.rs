//! Idempotent startup of named background resources.
//!
//! [`Process::ensure`] serializes startup of a name behind its lock, skips
//! everything when the cache already marks the name ready, and otherwise
//! prepares, launches and waits for the readiness pattern before recording
//! the name as ready.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use warden_core::{
    Cache, CacheExt, FileCache, Lock, LockGuard, MemoryCache, MemoryLock, NullCache, NullLock,
};

use crate::config::{CacheKind, LockKind, ProcessConfig, validate_name};
use crate::data::ProcessData;
use crate::error::{ProcessError, Result};
use crate::info::{ProcessInfo, group_exists, reap_exited};
use crate::launch::{self, BootState, LOCK_FILE};

/// Coordinator for named background resources.
///
/// Clones share the in-memory lock registry and cache, so a clone handed to
/// another thread coordinates with the original under
/// [`LockKind::Memory`] and [`CacheKind::Memory`].
#[derive(Debug, Clone)]
pub struct Process {
    config: ProcessConfig,
    memory_locks: Arc<Mutex<HashMap<String, MemoryLock>>>,
    memory_cache: MemoryCache,
}

impl Process {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            memory_locks: Arc::new(Mutex::new(HashMap::new())),
            memory_cache: MemoryCache::new(),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Makes sure the resource `name` is running and ready.
    ///
    /// Under the resource's lock:
    ///
    /// 1. if the cache marks `name` ready and its process is alive, returns
    ///    its handle without calling `prepare`;
    /// 2. otherwise calls `prepare` with the resource directory, launches
    ///    the described command and waits for its readiness pattern;
    /// 3. on readiness, marks `name` ready in the cache.
    ///
    /// The lock is released on every path.
    ///
    /// # Errors
    ///
    /// - whatever `prepare` returns, unchanged; the cache is not touched
    /// - [`ProcessError::Timeout`] if the pattern is not seen in time; the
    ///   process group is terminated first
    /// - [`ProcessError::Exited`] if the process exits before it is ready
    /// - [`ProcessError::Config`] if the configuration is invalid; nothing
    ///   is launched
    /// - lock, cache, launch and I/O failures
    pub fn ensure<F, E>(&self, name: &str, prepare: F) -> std::result::Result<ProcessInfo, E>
    where
        F: FnOnce(&Path) -> std::result::Result<ProcessData, E>,
        E: From<ProcessError>,
    {
        validate_name(name)?;
        self.config.validate()?;
        let dir = self.config.resource_dir(name);
        std::fs::create_dir_all(&dir).map_err(ProcessError::from)?;

        let lock = self.lock_for(name);
        let _guard = LockGuard::acquire(lock.as_ref()).map_err(ProcessError::from)?;
        let cache = self.cache();

        if cache.fetch(name, false).map_err(ProcessError::from)? {
            match self.getinfo(name) {
                Ok(info) if info.is_running() => {
                    tracing::debug!(name, pid = info.pid, "already running");
                    return Ok(info);
                }
                Ok(info) => {
                    tracing::warn!(name, pid = info.pid, "cached as ready but not running, relaunching");
                }
                Err(e) => {
                    tracing::warn!(name, error = %e, "cached as ready but no process found, relaunching");
                }
            }
            cache.store(name, &false).map_err(ProcessError::from)?;
        }
        self.stop_leftover(name)?;

        let data = prepare(&dir)?;
        let info = self.start(name, &dir, &data)?;
        cache.store(name, &true).map_err(ProcessError::from)?;
        Ok(info)
    }

    /// Returns the handle of the last process launched for `name`.
    ///
    /// A process launched by this coordinator that has since exited is
    /// reaped here, so it no longer reports as running.
    ///
    /// # Errors
    /// Returns [`ProcessError::NotFound`] if nothing was launched.
    pub fn getinfo(&self, name: &str) -> Result<ProcessInfo> {
        validate_name(name)?;
        let dir = self.config.resource_dir(name);
        let pid = launch::read_pid(name, &dir)?;
        reap_exited(pid);
        Ok(ProcessInfo::new(name, pid, launch::log_path(&dir))
            .with_terminate_timeout(self.config.terminate_timeout))
    }

    /// Returns true if the cache marks `name` ready.
    pub fn is_ready(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(self.cache().fetch(name, false)?)
    }

    /// Terminates the process of `name` and forgets that it was ready.
    ///
    /// # Errors
    /// Returns [`ProcessError::NotFound`] if nothing was launched.
    pub fn terminate(&self, name: &str) -> Result<()> {
        let info = self.getinfo(name)?;
        let lock = self.lock_for(name);
        let _guard = LockGuard::acquire(lock.as_ref())?;

        info.terminate()?;
        reap_exited(info.pid);
        self.cache().store(name, &false)?;
        Ok(())
    }

    /// Launches `data` and waits for it, cleaning up on failure.
    fn start(&self, name: &str, dir: &Path, data: &ProcessData) -> Result<ProcessInfo> {
        let mut launched = launch::launch(name, dir, data)?;
        let timeout = data.timeout().unwrap_or(self.config.timeout);

        let state = launched.wait_ready(data, timeout, self.config.poll_interval)?;
        let info = launched
            .info()
            .clone()
            .with_terminate_timeout(self.config.terminate_timeout);

        match state {
            BootState::Ready => {
                tracing::info!(name, pid = info.pid, "ready");
                Ok(launched.detach().with_terminate_timeout(self.config.terminate_timeout))
            }
            BootState::Exited(code) => {
                launched.reap();
                let output = boot_output(&info);
                tracing::error!(name, ?code, "exited before becoming ready");
                log_output(name, &output);
                Err(ProcessError::Exited {
                    name: name.to_string(),
                    code,
                    output,
                })
            }
            BootState::Booting => {
                let output = boot_output(&info);
                tracing::error!(
                    name,
                    timeout = %humantime::format_duration(timeout),
                    "not ready in time, terminating"
                );
                log_output(name, &output);
                if let Err(e) = info.terminate() {
                    tracing::warn!(name, error = %e, "failed to terminate");
                }
                launched.reap();
                Err(ProcessError::Timeout {
                    name: name.to_string(),
                    timeout,
                    output,
                })
            }
        }
    }

    /// Terminates whatever is left of an earlier launch, so a fresh launch
    /// does not collide with it.
    ///
    /// The leader may be gone while processes it spawned still hold the
    /// resource, so the whole group is checked.
    fn stop_leftover(&self, name: &str) -> Result<()> {
        match self.getinfo(name) {
            Ok(info) if info.is_running() || group_exists(info.pid) => {
                tracing::info!(name, pid = info.pid, "terminating leftover process group");
                info.terminate()?;
                reap_exited(info.pid);
                Ok(())
            }
            Ok(_) | Err(ProcessError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn lock_for(&self, name: &str) -> Box<dyn Lock> {
        match self.config.lock {
            #[cfg(unix)]
            LockKind::File => Box::new(warden_core::FileLock::new(
                self.config.resource_dir(name).join(LOCK_FILE),
            )),
            #[cfg(not(unix))]
            LockKind::File => {
                tracing::warn!(name, "file locks unsupported on this platform, using memory lock");
                Box::new(self.memory_lock(name))
            }
            LockKind::Memory => Box::new(self.memory_lock(name)),
            LockKind::Null => Box::new(NullLock::new()),
        }
    }

    fn memory_lock(&self, name: &str) -> MemoryLock {
        self.memory_locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| MemoryLock::new(name))
            .clone()
    }

    fn cache(&self) -> Box<dyn Cache> {
        match self.config.cache {
            CacheKind::File => Box::new(FileCache::new(self.config.cache_dir())),
            CacheKind::Memory => Box::new(self.memory_cache.clone()),
            CacheKind::Null => Box::new(NullCache::new()),
        }
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new(ProcessConfig::default())
    }
}

fn boot_output(info: &ProcessInfo) -> String {
    info.read_log().unwrap_or_else(|e| {
        tracing::warn!(name = %info.name, error = %e, "could not read boot output");
        String::new()
    })
}

fn log_output(name: &str, output: &str) {
    for line in output.lines() {
        tracing::error!(name, "{line}");
    }
}
