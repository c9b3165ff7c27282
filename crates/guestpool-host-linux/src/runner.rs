//! External command execution
//!
//! Every OS mutation goes through [`run`]: argument vector in, exit code and
//! captured output back. A command that ran and exited non-zero is not an
//! error at this layer; the caller decides what a given code means. Only a
//! command that could not even be launched produces the synthetic exit code
//! 127, with the launch error in stderr, so callers can treat both cases
//! uniformly as "command failed".

use std::ffi::OsStr;
use std::process::{Command, Stdio};

use guestpool_host_api::{HostError, HostResult};
use tracing::debug;

/// Exit code reported when the process could not be started at all
pub const LAUNCH_FAILED_CODE: i32 = 127;

/// Captured result of one external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Convert a non-zero exit into a [`HostError::CommandFailed`]
    pub fn require_success(self, command: &str) -> HostResult<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(HostError::CommandFailed {
                command: command.to_string(),
                code: self.code,
                detail: self.stderr_text(),
            })
        }
    }
}

/// Run an external command and wait for it, capturing stdout and stderr.
/// Never propagates launch errors; see module docs.
pub fn run<S: AsRef<OsStr>>(program: &str, args: &[S]) -> CommandOutput {
    let result = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output();

    match result {
        Ok(output) => {
            // killed by signal -> no code; report -1 like a generic failure
            let code = output.status.code().unwrap_or(-1);
            debug!(program, code, "Command finished");
            CommandOutput {
                code,
                stdout: output.stdout,
                stderr: output.stderr,
            }
        }
        Err(e) => {
            debug!(program, error = %e, "Command could not be launched");
            CommandOutput {
                code: LAUNCH_FAILED_CODE,
                stdout: Vec::new(),
                stderr: format!("failed to launch {}: {}", program, e).into_bytes(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_success() {
        let out = run("true", &[] as &[&str]);
        assert!(out.success());
    }

    #[test]
    fn nonzero_exit_is_reported_not_raised() {
        let out = run("false", &[] as &[&str]);
        assert!(!out.success());
        assert_ne!(out.code, LAUNCH_FAILED_CODE);
    }

    #[test]
    fn stdout_is_captured() {
        let out = run("echo", &["hello"]);
        assert!(out.success());
        assert_eq!(out.stdout_text().trim(), "hello");
    }

    #[test]
    fn launch_failure_yields_synthetic_code() {
        let out = run("/definitely/not/a/program", &[] as &[&str]);
        assert_eq!(out.code, LAUNCH_FAILED_CODE);
        assert!(out.stderr_text().contains("failed to launch"));
    }

    #[test]
    fn require_success_maps_to_host_error() {
        let err = run("false", &[] as &[&str])
            .require_success("false")
            .unwrap_err();
        assert!(matches!(
            err,
            guestpool_host_api::HostError::CommandFailed { .. }
        ));
    }

    #[test]
    fn arguments_are_not_shell_interpreted() {
        // a hostile "directory name" comes through as a literal argument
        let out = run("echo", &["$(touch /tmp/pwned); rm -rf /"]);
        assert!(out.success());
        assert!(out.stdout_text().contains("$(touch"));
    }
}
