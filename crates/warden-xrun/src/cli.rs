//! Command line of the `warden-xrun` binary.

use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::error::{Result, XrunError};

/// Runs a container in the foreground of a supervising process, and removes
/// it when that process goes away.
#[derive(Debug, Parser)]
#[command(name = "warden-xrun", version, about)]
pub struct Cli {
    /// Container engine program.
    #[arg(long, env = "WARDEN_DOCKER", default_value = crate::runtime::DEFAULT_PROGRAM, global = true)]
    pub docker: String,

    /// What to do.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a container and follow it until it is gone
    Run {
        /// Delay between checks of a container that exists but is not running
        #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
        interval: Duration,

        /// Arguments for `docker run`, without `--detach`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Wait for a supervisor to die, then clean up after it
    Reap {
        /// Supervisor process id
        #[arg(long)]
        pid: u32,

        /// Process group to kill once the supervisor is gone
        #[arg(long)]
        pgid: Option<u32>,

        /// Container to remove
        #[arg(long)]
        name: String,

        /// Delay between liveness checks
        #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
        interval: Duration,
    },
}

/// Rejects arguments that would detach the container.
///
/// Matches `-d`, `--detach`, `--detach=<bool>` and short flag clusters
/// such as `-itd`.
///
/// # Errors
/// Returns [`XrunError::Detach`] if any argument asks for detached mode.
pub fn check_detach(args: &[String]) -> Result<()> {
    if args.iter().any(|arg| is_detach(arg)) {
        return Err(XrunError::Detach);
    }
    Ok(())
}

fn is_detach(arg: &str) -> bool {
    if arg == "--detach" || arg.starts_with("--detach=") {
        return true;
    }
    match arg.strip_prefix('-') {
        Some(cluster) if !cluster.starts_with('-') && !cluster.is_empty() => {
            cluster.chars().all(|c| c.is_ascii_alphabetic()) && cluster.contains('d')
        }
        _ => false,
    }
}

/// Returns the container name given in `args`, adding a random one when
/// there is none.
pub fn ensure_name(args: &mut Vec<String>) -> String {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--name" {
            if let Some(name) = iter.next() {
                return name.clone();
            }
        } else if let Some(name) = arg.strip_prefix("--name=") {
            return name.to_string();
        }
    }

    let name = uuid::Uuid::new_v4().to_string();
    args.splice(0..0, ["--name".to_string(), name.clone()]);
    name
}
