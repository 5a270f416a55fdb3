//! Coordinator configuration.
//!
//! Configuration is validated at load time, with defaults suited to a test
//! session sharing one machine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};

/// Name of the directory under `control_dir` holding cache entries.
pub const CACHE_DIR_NAME: &str = ".cache";

/// Lock backing used to serialize startup of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    /// `flock(2)` on `<control_dir>/<name>/process.lock`; exclusive across processes.
    #[default]
    File,
    /// Shared flag inside the coordinator value; exclusive across its clones.
    Memory,
    /// No locking.
    Null,
}

/// Cache backing remembering which resources are ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// One JSON file per resource under `<control_dir>/.cache/`.
    #[default]
    File,
    /// Entries held by the coordinator value; lost when it is dropped.
    Memory,
    /// Never remembers anything; every `ensure` launches.
    Null,
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Base directory for per-resource state.
    #[serde(default = "default_control_dir")]
    pub control_dir: PathBuf,

    /// Lock backing.
    #[serde(default)]
    pub lock: LockKind,

    /// Cache backing.
    #[serde(default)]
    pub cache: CacheKind,

    /// How long to wait for the readiness pattern.
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Delay between readiness checks.
    #[serde(default = "default_poll_interval")]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Grace period between SIGTERM and SIGKILL when terminating.
    #[serde(default = "default_terminate_timeout")]
    #[serde(with = "humantime_serde")]
    pub terminate_timeout: Duration,
}

fn default_control_dir() -> PathBuf {
    std::env::temp_dir().join("warden")
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_terminate_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::new(default_control_dir())
    }
}

impl ProcessConfig {
    /// Creates a configuration rooted at `control_dir` with default settings.
    #[must_use]
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        Self {
            control_dir: control_dir.into(),
            lock: LockKind::default(),
            cache: CacheKind::default(),
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
            terminate_timeout: default_terminate_timeout(),
        }
    }

    /// Sets the lock backing.
    #[must_use]
    pub fn with_lock(mut self, lock: LockKind) -> Self {
        self.lock = lock;
        self
    }

    /// Sets the cache backing.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheKind) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the readiness timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the delay between readiness checks.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the SIGTERM to SIGKILL grace period.
    #[must_use]
    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// Directory holding the pid file, log and lock of `name`.
    #[must_use]
    pub fn resource_dir(&self, name: &str) -> PathBuf {
        self.control_dir.join(name)
    }

    /// Directory holding file cache entries.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.control_dir.join(CACHE_DIR_NAME)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.control_dir.as_os_str().is_empty() {
            return Err(ProcessError::config("control_dir cannot be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(ProcessError::config("poll_interval must be greater than 0"));
        }
        if self.timeout < self.poll_interval {
            return Err(ProcessError::config(
                "timeout must not be shorter than poll_interval",
            ));
        }
        Ok(())
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ProcessError::config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ProcessError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// Checks that `name` can be used as a lock, cache and directory identity.
///
/// # Errors
/// Returns a configuration error for empty names, `.`/`..`, or names
/// containing path separators.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProcessError::config("resource name cannot be empty"));
    }
    if name == "." || name == ".." || name == CACHE_DIR_NAME {
        return Err(ProcessError::config(format!("reserved resource name: {name}")));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(ProcessError::config(format!(
            "resource name must not contain path separators: {name}"
        )));
    }
    Ok(())
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
