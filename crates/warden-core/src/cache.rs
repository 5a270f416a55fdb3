//! Key/value store remembering which resources were already prepared.
//!
//! Values are opaque JSON documents. [`CacheExt`] adds typed access on top of
//! the object-safe [`Cache`] trait.

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CacheError, CacheResult};

/// Key/value store.
///
/// `get` returns `default` for an absent key and never fails for that reason;
/// `set` overwrites unconditionally.
pub trait Cache: Send + Sync + fmt::Debug {
    /// Returns the stored value for `key`, or `default` when absent.
    fn get(&self, key: &str, default: Value) -> CacheResult<Value>;

    /// Stores `value` under `key`.
    fn set(&self, key: &str, value: Value) -> CacheResult<()>;
}

/// Typed access to any [`Cache`].
pub trait CacheExt: Cache {
    /// Returns the value for `key` deserialized as `T`, or `default`.
    fn fetch<T>(&self, key: &str, default: T) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let default = serde_json::to_value(default).map_err(|e| CacheError::serialization(key, e))?;
        let value = self.get(key, default)?;
        serde_json::from_value(value).map_err(|e| CacheError::serialization(key, e))
    }

    /// Serializes `value` and stores it under `key`.
    fn store<T>(&self, key: &str, value: &T) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(|e| CacheError::serialization(key, e))?;
        self.set(key, value)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

// =============================================================================
// FileCache
// =============================================================================

/// Persistent cache storing one JSON file per key under a base directory.
///
/// Writes go to a unique temporary file that is then renamed over the entry,
/// so concurrent writers never leave a torn file and distinct keys never
/// touch each other.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Creates a cache rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the base directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file backing `key`.
    #[must_use]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Maps a key to a file name: `[A-Za-z0-9_-]` pass through, everything else
/// (including `.` and `/`) becomes `%XX`.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

impl Cache for FileCache {
    fn get(&self, key: &str, default: Value) -> CacheResult<Value> {
        let path = self.entry_path(key);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(default),
            Err(e) => return Err(CacheError::io(key, e)),
        };
        serde_json::from_slice(&content).map_err(|e| CacheError::serialization(key, e))
    }

    fn set(&self, key: &str, value: Value) -> CacheResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(key, e))?;

        let content = serde_json::to_vec(&value).map_err(|e| CacheError::serialization(key, e))?;
        let path = self.entry_path(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", encode_key(key), uuid::Uuid::new_v4()));

        std::fs::write(&tmp, content).map_err(|e| CacheError::io(key, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(CacheError::io(key, e));
        }

        tracing::trace!(key, path = %path.display(), "stored cache entry");
        Ok(())
    }
}

// =============================================================================
// MemoryCache
// =============================================================================

/// In-process cache. Clones share entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str, default: Value) -> CacheResult<Value> {
        Ok(self.entries.read().get(key).cloned().unwrap_or(default))
    }

    fn set(&self, key: &str, value: Value) -> CacheResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// NullCache
// =============================================================================

/// Cache that remembers nothing: `get` always returns the default, `set` is a
/// no-op. Disables caching without changing call sites.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl NullCache {
    /// Creates a null cache.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Cache for NullCache {
    fn get(&self, _key: &str, default: Value) -> CacheResult<Value> {
        Ok(default)
    }

    fn set(&self, _key: &str, _value: Value) -> CacheResult<()> {
        Ok(())
    }
}
