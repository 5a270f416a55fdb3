//! One-shot external commands.

use std::ffi::OsStr;
use std::process::{Command, ExitStatus, Stdio};

use crate::error::CommandError;

/// Runs `argv` to completion and returns its stdout.
///
/// Stdin is closed. On a non-zero exit the error carries the exit code and
/// stdout followed by stderr, so callers can match on engine messages.
///
/// # Errors
/// - [`CommandError::Spawn`] if `argv` is empty or the program cannot start
/// - [`CommandError::Failed`] if it exits unsuccessfully
pub fn run_command<S: AsRef<OsStr>>(argv: &[S]) -> Result<String, CommandError> {
    let mut command = build(argv)?;
    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CommandError::spawn(program(argv), e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let mut combined = stdout;
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(failed(argv, output.status, combined))
}

/// Runs `argv` to completion with inherited stdio.
///
/// # Errors
/// Same as [`run_command`]; a failure carries no output.
pub fn check_call<S: AsRef<OsStr>>(argv: &[S]) -> Result<(), CommandError> {
    let status = build(argv)?
        .stdin(Stdio::null())
        .status()
        .map_err(|e| CommandError::spawn(program(argv), e))?;

    if status.success() {
        Ok(())
    } else {
        Err(failed(argv, status, String::new()))
    }
}

fn build<S: AsRef<OsStr>>(argv: &[S]) -> Result<Command, CommandError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(CommandError::spawn(
            "",
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        ));
    };
    tracing::debug!(command = %render(argv), "running");

    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

fn failed<S: AsRef<OsStr>>(argv: &[S], status: ExitStatus, output: String) -> CommandError {
    CommandError::Failed {
        command: render(argv),
        code: status.code(),
        output,
    }
}

fn program<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.first()
        .map(|p| p.as_ref().to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn render<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| arg.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_returns_stdout() {
        let output = run_command(&["sh", "-c", "echo out; echo err >&2"]).unwrap();
        assert_eq!(output, "out\n");
    }

    #[test]
    fn test_run_command_failure_carries_output() {
        let err = run_command(&["sh", "-c", "echo out; echo err >&2; exit 3"]).unwrap_err();
        match err {
            CommandError::Failed {
                command,
                code,
                output,
            } => {
                assert_eq!(command, "sh -c echo out; echo err >&2; exit 3");
                assert_eq!(code, Some(3));
                assert_eq!(output, "out\nerr\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_command_missing_program() {
        let err = run_command(&["/nonexistent/warden-program"]).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { program, .. } if program == "/nonexistent/warden-program"));
    }

    #[test]
    fn test_run_command_empty() {
        let argv: [&str; 0] = [];
        assert!(matches!(
            run_command(&argv),
            Err(CommandError::Spawn { .. })
        ));
    }

    #[test]
    fn test_check_call() {
        check_call(&["true"]).unwrap();
        let err = check_call(&["sh", "-c", "exit 2"]).unwrap_err();
        assert!(matches!(err, CommandError::Failed { code: Some(2), .. }));
    }
}
