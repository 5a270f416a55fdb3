// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # warden-process
//!
//! Starts long-lived background processes at most once per name, even when
//! many test workers ask for them at the same time.
//!
//! - [`Process`]: the coordinator; [`Process::ensure`] is idempotent
//! - [`ProcessData`]: what to run and which output line means "ready"
//! - [`ProcessInfo`]: handle to a running resource
//! - [`ResourceServer`]: resource types that describe their own launch
//!
//! ## Example
//!
//! ```rust,no_run
//! use warden_process::{Process, ProcessConfig, ProcessData, ProcessError};
//!
//! let process = Process::new(ProcessConfig::new("/tmp/warden"));
//! let info = process.ensure("echo-server", |_dir| {
//!     ProcessData::new("listening", ["sh", "-c", "echo listening; sleep 600"])
//! })?;
//! assert!(info.is_running());
//! # Ok::<(), ProcessError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod info;
pub mod launch;
pub mod server;

pub use config::{CacheKind, LockKind, ProcessConfig};
pub use coordinator::Process;
pub use data::ProcessData;
pub use error::{ProcessError, Result};
pub use info::{GroupSignal, ProcessInfo, group_exists, is_alive, reap_exited, signal_group};
pub use server::ResourceServer;
