//! Resource types that know how to describe themselves.

use std::path::Path;

use crate::coordinator::Process;
use crate::data::ProcessData;
use crate::error::ProcessError;
use crate::info::ProcessInfo;

/// A resource that can be started through a [`Process`] coordinator.
///
/// Implementors only describe the launch; [`ResourceServer::start`] takes
/// care of locking, caching and readiness.
pub trait ResourceServer {
    /// Error returned by [`ResourceServer::prepare`].
    type Error: From<ProcessError>;

    /// Describes how to launch the resource. `dir` is the resource's
    /// private directory and the working directory of the launched command.
    fn prepare(&self, dir: &Path) -> Result<ProcessData, Self::Error>;

    /// Starts the resource under `name`, or returns the running one.
    fn start(&self, process: &Process, name: &str) -> Result<ProcessInfo, Self::Error> {
        process.ensure(name, |dir| self.prepare(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheKind, LockKind, ProcessConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingServer {
        calls: AtomicUsize,
    }

    impl ResourceServer for FailingServer {
        type Error = ProcessError;

        fn prepare(&self, dir: &Path) -> Result<ProcessData, ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(dir.ends_with("svc"));
            Err(ProcessError::config("no image"))
        }
    }

    #[test]
    fn test_start_calls_prepare_with_resource_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let process = Process::new(
            ProcessConfig::new(dir.path())
                .with_lock(LockKind::Memory)
                .with_cache(CacheKind::Memory),
        );
        let server = FailingServer {
            calls: AtomicUsize::new(0),
        };

        let err = server.start(&process, "svc").unwrap_err();
        assert_eq!(err.to_string(), "configuration error: no image");
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("svc").is_dir());
    }
}
