//! Warden: idempotent cross-process coordination of long-lived test
//! resources.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use warden::prelude::*;
//!
//! let process = Process::new(ProcessConfig::new("/tmp/warden"));
//! let info = process.ensure("echo-server", |_dir| {
//!     ProcessData::new("listening", ["sh", "-c", "echo listening; sleep 600"])
//! })?;
//! assert!(process.is_ready("echo-server")?);
//! info.terminate()?;
//! # Ok::<(), ProcessError>(())
//! ```

pub use warden_core as core;
pub use warden_process as process;
pub use warden_xrun as xrun;

/// Prelude module for common imports.
pub mod prelude {
    pub use warden_core::{
        Cache, CacheExt, Lock, LockGuard, MemoryCache, MemoryLock, Outcome, RetryError, retry,
    };
    #[cfg(unix)]
    pub use warden_core::FileLock;
    pub use warden_process::{
        Process, ProcessConfig, ProcessData, ProcessError, ProcessInfo, ResourceServer,
    };
    pub use warden_xrun::{ContainerRuntime, DockerCli};
}
