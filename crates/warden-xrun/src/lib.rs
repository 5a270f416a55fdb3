// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # warden-xrun
//!
//! Keeps a container tied to the lifetime of a foreground process.
//!
//! `warden-xrun run -- <docker run args>` starts the container detached,
//! follows its output, and removes it on SIGTERM, SIGINT or SIGHUP. Before
//! starting the container it spawns `warden-xrun reap`, which removes the
//! container and kills the supervisor's process group when the supervisor
//! dies for any other reason, SIGKILL included.
//!
//! - [`runtime`]: the [`ContainerRuntime`] collaborator and [`DockerCli`]
//! - [`monitor`]: the following/checking/stopped supervision loop
//! - [`reaper`]: cleanup after the supervisor dies
//! - [`supervisor`]: signal-aware foreground supervision
//! - [`cli`]: command line parsing

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod command;
pub mod error;
pub mod monitor;
pub mod reaper;
pub mod runtime;
pub mod supervisor;

pub use command::{check_call, run_command};
pub use error::{CommandError, Result, XrunError};
pub use monitor::{Monitor, MonitorState};
pub use reaper::{Reaper, spawn_reaper};
pub use runtime::{ContainerRuntime, ContainerStatus, DockerCli};
pub use supervisor::{ShutdownSignals, Supervisor};
