// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # warden-core
//!
//! Building blocks for coordinating expensive shared resources across
//! processes:
//!
//! - [`Lock`]: mutual exclusion, backed by a file ([`FileLock`]), process
//!   memory ([`MemoryLock`]) or nothing at all ([`NullLock`])
//! - [`Cache`]: key/value memory of what is already prepared, with
//!   [`FileCache`], [`MemoryCache`] and [`NullCache`]
//! - [`retry`]: bounded polling of a success condition
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use warden_core::{Cache, Lock, MemoryCache, MemoryLock};
//!
//! let lock = MemoryLock::new("svc");
//! let cache = MemoryCache::new();
//!
//! let _guard = lock.scoped()?;
//! if cache.get("svc", json!(false))? == json!(false) {
//!     // prepare the resource once
//!     cache.set("svc", json!(true))?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod lock;
pub mod retry;

pub use cache::{Cache, CacheExt, FileCache, MemoryCache, NullCache};
pub use error::{CacheError, CacheResult, LockError, LockResult};
#[cfg(unix)]
pub use lock::FileLock;
pub use lock::{Lock, LockGuard, MemoryLock, NullLock};
pub use retry::{Outcome, Poller, Probe, ProbeResult, RetryError, retry};
