//! External command execution
//!
//! Runs a program to completion and captures its standard output.

use std::ffi::{OsStr, OsString};
use std::io;
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;

/// Errors that can occur when running the external command
#[derive(Debug, Error)]
pub enum ExecError {
    /// No program was given
    #[error("no command to run")]
    EmptyCommand,

    /// The program could not be started (not found, not executable, ...)
    #[error("cannot run command `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program ran but did not exit successfully
    #[error("command `{program}` failed with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Runs a command and returns everything it wrote to standard output
pub trait CommandExecutor {
    fn execute(&self, program: &OsStr, args: &[OsString]) -> Result<Vec<u8>, ExecError>;
}

/// Executor backed by `std::process::Command`
///
/// Standard input is the null device and standard error goes straight to
/// the terminal, only standard output is captured.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, program: &OsStr, args: &[OsString]) -> Result<Vec<u8>, ExecError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string_lossy().into_owned(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExecError::Failed {
                program: program.to_string_lossy().into_owned(),
                status: output.status,
            });
        }

        Ok(output.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<OsString> {
        parts.iter().map(|s| OsString::from(*s)).collect()
    }

    fn run(program: &str, parts: &[&str]) -> Result<Vec<u8>, ExecError> {
        SystemExecutor.execute(OsStr::new(program), &args(parts))
    }

    #[test]
    fn test_captures_stdout() {
        let output = run("echo", &["hi"]).unwrap();
        assert_eq!(output, b"hi\n");
    }

    #[test]
    fn test_arguments_are_passed_verbatim() {
        let output = run("printf", &["%s|", "a b", "c"]).unwrap();
        assert_eq!(output, b"a b|c|");
    }

    #[test]
    fn test_stdin_is_empty() {
        let output = run("cat", &[]).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let result = run("clic-definitely-not-a-program", &[]);
        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }

    #[test]
    fn test_non_zero_exit_is_failure() {
        let result = run("sh", &["-c", "echo partial; exit 3"]);
        match result {
            Err(ExecError::Failed { program, status }) => {
                assert_eq!(program, "sh");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_non_utf8_argument_reaches_the_program() {
        use std::os::unix::ffi::OsStrExt;

        let raw = OsStr::from_bytes(b"caf\xe9").to_os_string();
        let output = SystemExecutor
            .execute(OsStr::new("printf"), &[OsString::from("%s"), raw])
            .unwrap();
        assert_eq!(output, b"caf\xe9");
    }
}
