//! Error types for warden-core.
//!
//! Lock and cache failures are explicit values; nothing here panics.

use std::path::PathBuf;

/// Result type alias for lock operations.
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Result type alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors raised by [`Lock`](crate::lock::Lock) implementations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// `lock()` called on a lock that is already held.
    #[error("already locked: {0}")]
    AlreadyLocked(String),

    /// `unlock()` called on a lock that is not held.
    #[error("not locked: {0}")]
    NotLocked(String),

    /// Underlying lock file could not be opened or locked.
    #[error("lock file {}: {source}", path.display())]
    Io {
        /// Path of the lock file.
        path: PathBuf,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    /// Creates an already-locked error.
    #[must_use]
    pub fn already_locked(identity: impl Into<String>) -> Self {
        Self::AlreadyLocked(identity.into())
    }

    /// Creates a not-locked error.
    #[must_use]
    pub fn not_locked(identity: impl Into<String>) -> Self {
        Self::NotLocked(identity.into())
    }

    /// Creates an I/O error for the given lock path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for the contention errors (`AlreadyLocked`, `NotLocked`).
    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::AlreadyLocked(_) | Self::NotLocked(_))
    }
}

/// Errors raised by [`Cache`](crate::cache::Cache) implementations.
///
/// A missing key is never an error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// I/O error while reading or writing a cache entry.
    #[error("cache entry {key}: {source}")]
    Io {
        /// The cache key.
        key: String,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },

    /// A value could not be (de)serialized.
    #[error("cache entry {key}: serialization error: {source}")]
    Serialization {
        /// The cache key.
        key: String,
        /// The serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Creates an I/O error for the given key.
    #[must_use]
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    /// Creates a serialization error for the given key.
    #[must_use]
    pub fn serialization(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            key: key.into(),
            source,
        }
    }
}
