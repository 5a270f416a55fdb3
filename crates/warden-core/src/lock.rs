//! Advisory locks scoping exclusive startup of a named resource.
//!
//! Three interchangeable implementations share the [`Lock`] contract:
//!
//! - [`FileLock`]: `flock(2)` on a lock file, exclusive across processes
//! - [`MemoryLock`]: shared flag, exclusive across clones within one process
//! - [`NullLock`]: never locked, never fails
//!
//! # Stale locks
//!
//! `flock` locks belong to the open file description, so the kernel releases
//! them when the holder exits for any reason, including `SIGKILL`. A lock file
//! left on disk by a crashed holder is therefore never stale: the next
//! `lock()` simply succeeds. Lock files are not removed on unlock, since
//! unlinking a path other processes may be waiting on would split them onto
//! different inodes.

use std::fmt;
#[cfg(unix)]
use std::fs::{File, OpenOptions};
#[cfg(unix)]
use std::io::Write;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};
use parking_lot::Mutex;

use crate::error::{LockError, LockResult};

/// Mutual-exclusion primitive.
///
/// `lock()` fails with [`LockError::AlreadyLocked`] when this handle already
/// holds the lock; `unlock()` fails with [`LockError::NotLocked`] when it does
/// not. Prefer [`LockGuard`] over pairing the calls by hand.
pub trait Lock: Send + Sync + fmt::Debug {
    /// Acquires the lock.
    fn lock(&self) -> LockResult<()>;

    /// Releases the lock.
    fn unlock(&self) -> LockResult<()>;

    /// Returns true while the lock is held through this handle.
    fn is_locked(&self) -> bool;

    /// Acquires the lock for the lifetime of the returned guard.
    fn scoped(&self) -> LockResult<LockGuard<'_>>
    where
        Self: Sized,
    {
        LockGuard::acquire(self)
    }
}

/// Holds a [`Lock`] until dropped.
///
/// Release happens on every exit path, including early returns through `?`
/// and unwinding.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a dyn Lock,
}

impl<'a> LockGuard<'a> {
    /// Locks `lock` and wraps it in a guard.
    pub fn acquire(lock: &'a dyn Lock) -> LockResult<Self> {
        lock.lock()?;
        Ok(Self { lock })
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("lock", &self.lock).finish()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            tracing::warn!(lock = ?self.lock, error = %e, "failed to release lock");
        }
    }
}

// =============================================================================
// FileLock
// =============================================================================

/// Persistent lock backed by `flock(2)` on a file.
///
/// Contention from another process (or another `FileLock` on the same path)
/// blocks in [`lock`](Lock::lock) until the holder releases or dies.
/// [`FileLock::try_lock`] fails fast instead.
#[cfg(unix)]
pub struct FileLock {
    path: PathBuf,
    held: Mutex<Option<Flock<File>>>,
}

#[cfg(unix)]
impl FileLock {
    /// Creates a lock on `path`. The file is created on first `lock()`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: Mutex::new(None),
        }
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires the lock without blocking.
    ///
    /// Returns [`LockError::AlreadyLocked`] if any holder, in this process or
    /// another, currently owns it.
    pub fn try_lock(&self) -> LockResult<()> {
        self.acquire(FlockArg::LockExclusiveNonblock)
    }

    fn acquire(&self, arg: FlockArg) -> LockResult<()> {
        if self.held.lock().is_some() {
            return Err(LockError::already_locked(self.identity()));
        }

        // The mutex is not held across a blocking flock; a second open of
        // the same path contends in the kernel instead.
        let file = self.open()?;
        let flock = match Flock::lock(file, arg) {
            Ok(flock) => flock,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(LockError::already_locked(self.identity()));
            }
            Err((_, errno)) => {
                return Err(LockError::io(&self.path, std::io::Error::from(errno)));
            }
        };

        record_owner(&flock);

        let mut held = self.held.lock();
        if held.is_some() {
            return Err(LockError::already_locked(self.identity()));
        }
        *held = Some(flock);
        tracing::debug!(path = %self.path.display(), "acquired file lock");
        Ok(())
    }

    fn open(&self) -> LockResult<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LockError::io(&self.path, e))?;
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| LockError::io(&self.path, e))
    }

    fn identity(&self) -> String {
        self.path.display().to_string()
    }
}

/// Writes the holder's PID into the lock file for debugging.
#[cfg(unix)]
fn record_owner(flock: &Flock<File>) {
    let mut file: &File = flock;
    let written = file
        .set_len(0)
        .and_then(|()| writeln!(file, "{}", std::process::id()));
    if let Err(e) = written {
        tracing::debug!(error = %e, "could not record lock owner");
    }
}

#[cfg(unix)]
impl Lock for FileLock {
    fn lock(&self) -> LockResult<()> {
        self.acquire(FlockArg::LockExclusive)
    }

    fn unlock(&self) -> LockResult<()> {
        let flock = self
            .held
            .lock()
            .take()
            .ok_or_else(|| LockError::not_locked(self.identity()))?;

        flock
            .unlock()
            .map_err(|(_, errno)| LockError::io(&self.path, std::io::Error::from(errno)))?;
        tracing::debug!(path = %self.path.display(), "released file lock");
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.held.lock().is_some()
    }
}

#[cfg(unix)]
impl fmt::Debug for FileLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLock")
            .field("path", &self.path)
            .field("locked", &self.is_locked())
            .finish()
    }
}

// =============================================================================
// MemoryLock
// =============================================================================

/// In-process lock.
///
/// Clones share state, so a clone handed to another thread contends with the
/// original. Contention fails fast with [`LockError::AlreadyLocked`].
#[derive(Debug, Clone)]
pub struct MemoryLock {
    name: Arc<str>,
    locked: Arc<Mutex<bool>>,
}

impl MemoryLock {
    /// Creates an unlocked lock identified by `name`.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            locked: Arc::new(Mutex::new(false)),
        }
    }

    /// Returns the lock's identity.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for MemoryLock {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl Lock for MemoryLock {
    fn lock(&self) -> LockResult<()> {
        let mut locked = self.locked.lock();
        if *locked {
            return Err(LockError::already_locked(self.name.as_ref()));
        }
        *locked = true;
        Ok(())
    }

    fn unlock(&self) -> LockResult<()> {
        let mut locked = self.locked.lock();
        if !*locked {
            return Err(LockError::not_locked(self.name.as_ref()));
        }
        *locked = false;
        Ok(())
    }

    fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

// =============================================================================
// NullLock
// =============================================================================

/// Lock that does nothing.
///
/// `is_locked()` is always false and neither operation ever fails. Used to
/// disable locking without changing call sites.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLock;

impl NullLock {
    /// Creates a null lock.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Lock for NullLock {
    fn lock(&self) -> LockResult<()> {
        Ok(())
    }

    fn unlock(&self) -> LockResult<()> {
        Ok(())
    }

    fn is_locked(&self) -> bool {
        false
    }
}
