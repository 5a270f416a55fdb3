//! Container engine collaborator.
//!
//! The supervisor only needs five operations from a container engine; the
//! [`ContainerRuntime`] trait names them and [`DockerCli`] implements them
//! by shelling out to a Docker compatible CLI (`docker`, `podman`).

use std::fmt;

use crate::command::{check_call, run_command};
use crate::error::CommandError;

/// Default container engine program.
pub const DEFAULT_PROGRAM: &str = "docker";

/// Inspect template producing `<status> <running>`.
const STATUS_FORMAT: &str = "{{.State.Status}} {{.State.Running}}";

/// State of an existing container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    /// Engine status word (`created`, `running`, `exited`, ...).
    pub status: String,
    /// Whether the container is running.
    pub running: bool,
}

impl ContainerStatus {
    /// Parses `<status> <running>` as printed by [`STATUS_FORMAT`].
    fn parse(output: &str) -> Self {
        let mut words = output.split_whitespace();
        let status = words.next().unwrap_or_default().to_string();
        let running = words.next() == Some("true");
        Self { status, running }
    }
}

/// Operations the supervisor performs on a named container.
pub trait ContainerRuntime: Send + Sync {
    /// Status of `name`, or `None` if no such container exists.
    fn status(&self, name: &str) -> Result<Option<ContainerStatus>, CommandError>;

    /// Returns true if `name` exists and is running.
    fn is_running(&self, name: &str) -> Result<bool, CommandError> {
        Ok(self.status(name)?.is_some_and(|status| status.running))
    }

    /// Streams the container's output to stdout until it stops.
    fn follow(&self, name: &str) -> Result<(), CommandError>;

    /// Starts a detached container from `docker run` style `args`.
    ///
    /// Returns the container id, or `None` if the name is already in use.
    fn run_detached(&self, args: &[String]) -> Result<Option<String>, CommandError>;

    /// Force-removes `name` and its volumes. A missing container is not an
    /// error.
    fn remove(&self, name: &str) -> Result<(), CommandError>;
}

// =============================================================================
// DockerCli
// =============================================================================

/// [`ContainerRuntime`] backed by a Docker compatible command line.
#[derive(Clone, PartialEq, Eq)]
pub struct DockerCli {
    program: String,
    global_args: Vec<String>,
}

impl DockerCli {
    /// Uses `program` as the engine CLI.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
        }
    }

    /// Arguments placed before every subcommand (`--context`, `--host`).
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// The engine program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn argv<'a>(&'a self, args: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        std::iter::once(self.program.as_str())
            .chain(self.global_args.iter().map(String::as_str))
            .chain(args)
            .collect()
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl fmt::Debug for DockerCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerCli")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl ContainerRuntime for DockerCli {
    fn status(&self, name: &str) -> Result<Option<ContainerStatus>, CommandError> {
        match run_command(&self.argv(["inspect", "--format", STATUS_FORMAT, name])) {
            Ok(output) => Ok(Some(ContainerStatus::parse(&output))),
            Err(e) if e.output_contains("No such") => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn follow(&self, name: &str) -> Result<(), CommandError> {
        check_call(&self.argv(["logs", "--follow", name]))
    }

    fn run_detached(&self, args: &[String]) -> Result<Option<String>, CommandError> {
        let argv = self.argv(["run", "--detach"].into_iter().chain(args.iter().map(String::as_str)));
        match run_command(&argv) {
            Ok(output) => Ok(Some(output.trim().to_string())),
            Err(e) if e.output_contains("is already in use") => {
                tracing::warn!(
                    output = e.output().unwrap_or_default().trim(),
                    "container name already in use"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn remove(&self, name: &str) -> Result<(), CommandError> {
        match run_command(&self.argv(["rm", "--force", "--volumes", name])) {
            Ok(_) => {
                tracing::info!(name, "removed container");
                Ok(())
            }
            Err(e) if e.output_contains("No such container") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(
            ContainerStatus::parse("running true\n"),
            ContainerStatus {
                status: "running".into(),
                running: true,
            }
        );
        assert!(!ContainerStatus::parse("exited false\n").running);
        assert!(!ContainerStatus::parse("").running);
    }

    #[test]
    fn test_docker_cli_argv() {
        let cli = DockerCli::new("podman").with_args(["--remote"]);
        assert_eq!(cli.program(), "podman");
        assert_eq!(cli.argv(["rm", "svc"]), ["podman", "--remote", "rm", "svc"]);
        assert_eq!(DockerCli::default().program(), "docker");
    }

    #[cfg(unix)]
    mod fake_engine {
        use super::*;
        use std::path::{Path, PathBuf};
        use tempfile::TempDir;

        /// An engine script run through `sh` that logs its arguments.
        struct FakeEngine {
            dir: TempDir,
        }

        impl FakeEngine {
            fn new(body: &str) -> Self {
                let dir = TempDir::new().unwrap();
                let script = format!(
                    "echo \"$@\" >> '{}'\n{body}\n",
                    dir.path().join("calls").display()
                );
                std::fs::write(dir.path().join("engine.sh"), script).unwrap();
                Self { dir }
            }

            fn cli(&self) -> DockerCli {
                DockerCli::new("sh").with_args([self.script().display().to_string()])
            }

            fn script(&self) -> PathBuf {
                self.dir.path().join("engine.sh")
            }

            fn calls(&self) -> Vec<String> {
                read_lines(&self.dir.path().join("calls"))
            }
        }

        fn read_lines(path: &Path) -> Vec<String> {
            std::fs::read_to_string(path)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        #[test]
        fn test_status_running() {
            let engine = FakeEngine::new("echo 'running true'");
            let status = engine.cli().status("svc").unwrap().unwrap();
            assert_eq!(status.status, "running");
            assert!(status.running);
            assert!(engine.cli().is_running("svc").unwrap());
            assert_eq!(
                engine.calls()[0],
                "inspect --format {{.State.Status}} {{.State.Running}} svc"
            );
        }

        #[test]
        fn test_status_missing() {
            let engine = FakeEngine::new("echo 'Error: No such object: svc' >&2; exit 1");
            assert_eq!(engine.cli().status("svc").unwrap(), None);
            assert!(!engine.cli().is_running("svc").unwrap());
        }

        #[test]
        fn test_status_missing_lowercase_message() {
            let engine = FakeEngine::new("echo 'Error: no such object: svc' >&2; exit 125");
            assert_eq!(engine.cli().status("svc").unwrap(), None);
        }

        #[test]
        fn test_status_engine_failure() {
            let engine = FakeEngine::new("echo 'Cannot connect to the Docker daemon' >&2; exit 1");
            assert!(engine.cli().status("svc").unwrap_err().is_failed());
        }

        #[test]
        fn test_run_detached_returns_id() {
            let engine = FakeEngine::new("echo abc123");
            let args = vec!["--name".to_string(), "svc".to_string(), "alpine".to_string()];
            let id = engine.cli().run_detached(&args).unwrap();
            assert_eq!(id.as_deref(), Some("abc123"));
            assert_eq!(engine.calls(), ["run --detach --name svc alpine"]);
        }

        #[test]
        fn test_run_detached_already_in_use() {
            let engine = FakeEngine::new(
                "echo 'Conflict. The container name \"/svc\" is already in use' >&2; exit 125",
            );
            let args = vec!["--name".to_string(), "svc".to_string()];
            assert_eq!(engine.cli().run_detached(&args).unwrap(), None);
        }

        #[test]
        fn test_run_detached_error() {
            let engine = FakeEngine::new("exit 125");
            assert!(engine.cli().run_detached(&[]).is_err());
        }

        #[test]
        fn test_remove_missing_is_ok() {
            let engine = FakeEngine::new("echo 'Error: No such container: svc' >&2; exit 1");
            engine.cli().remove("svc").unwrap();
            assert_eq!(engine.calls(), ["rm --force --volumes svc"]);
        }

        #[test]
        fn test_remove_failure() {
            let engine = FakeEngine::new("echo 'removal in progress' >&2; exit 1");
            assert!(engine.cli().remove("svc").unwrap_err().is_failed());
        }

        #[test]
        fn test_follow() {
            let engine = FakeEngine::new("exit 0");
            engine.cli().follow("svc").unwrap();
            assert_eq!(engine.calls(), ["logs --follow svc"]);
        }
    }
}
