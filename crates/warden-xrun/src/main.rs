//! `warden-xrun`: run a container for as long as this process lives.
//!
//! # Usage
//!
//! ```bash
//! warden-xrun run -- --rm --name redis redis:7
//! warden-xrun --docker podman run --interval 500ms -- alpine sleep 60
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;
use warden_xrun::cli::{Cli, Commands, check_detach, ensure_name};
use warden_xrun::{
    ContainerRuntime, DockerCli, Reaper, ShutdownSignals, Supervisor, XrunError, spawn_reaper,
};

/// How long blocking engine calls may linger after the supervisor returns.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the container's output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(XrunError::Detach) => Cli::command()
            .error(ErrorKind::ArgumentConflict, XrunError::Detach.to_string())
            .exit(),
        Err(e) => {
            tracing::error!(error = %e, "warden-xrun failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, XrunError> {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(cli.docker.as_str()));

    match cli.command {
        Commands::Run { interval, mut args } => {
            check_detach(&args)?;
            let name = ensure_name(&mut args);

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let code = rt.block_on(async {
                let signals = ShutdownSignals::install()?;
                // The reaper must be watching before the container exists.
                let _reaper = spawn_reaper(&cli.docker, &name)?;
                Supervisor::new(runtime, name)
                    .with_interval(interval)
                    .run(args, signals)
                    .await
            });
            rt.shutdown_timeout(SHUTDOWN_TIMEOUT);

            Ok(exit_code(code?))
        }
        Commands::Reap {
            pid,
            pgid,
            name,
            interval,
        } => {
            Reaper::new(runtime, pid, name)
                .with_pgid(pgid)
                .with_interval(interval)
                .run()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
