//! Command execution seam.
//!
//! `CommandExecutor` is the trait the runtime layer uses to run the
//! container CLI. `ProcessExecutor` is the production implementation;
//! tests swap in [`FakeDocker`](crate::fake::FakeDocker).

use std::process::Command;
use std::sync::Arc;

use dockhand_common::error::{DockhandError, Result};

/// Captured result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit status; `-1` when the process was killed by a signal.
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a program with arguments and reports how it exited.
///
/// Implementations block until the program finishes. A non-zero exit is a
/// normal [`CommandOutput`]; only failing to run the program at all is an
/// error.
pub trait CommandExecutor: Send + Sync {
    /// Runs `program` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::Spawn`] if the program cannot be started.
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for Arc<E> {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        (**self).execute(program, args)
    }
}

/// Executor that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl CommandExecutor for ProcessExecutor {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(command = %command_line(program, args), "spawning");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| DockhandError::Spawn {
                program: program.to_string(),
                source: e,
            })?;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Renders a command for logs and error messages, quoting arguments that
/// contain whitespace.
#[must_use]
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.chars().any(char::is_whitespace) {
            line.push('\'');
            line.push_str(&arg.replace('\'', "'\\''"));
            line.push('\'');
        } else {
            line.push_str(arg);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn command_line_quotes_whitespace() {
        let line = command_line("docker", &args(&["exec", "c1", "/bin/sh", "-c", "touch /root/a"]));
        assert_eq!(line, "docker exec c1 /bin/sh -c 'touch /root/a'");
    }

    #[test]
    fn command_line_quotes_empty_argument() {
        assert_eq!(command_line("echo", &args(&[""])), "echo ''");
    }

    #[test]
    fn output_helpers() {
        assert!(CommandOutput::ok("id").success());
        let failed = CommandOutput::failed(125, "boom");
        assert!(!failed.success());
        assert_eq!(failed.stderr, "boom");
    }

    #[cfg(unix)]
    #[test]
    fn process_executor_captures_exit_and_streams() {
        let out = ProcessExecutor
            .execute("sh", &args(&["-c", "echo out; echo err >&2; exit 3"]))
            .expect("sh should spawn");
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[test]
    fn process_executor_reports_spawn_failure() {
        let err = ProcessExecutor
            .execute("dockhand-no-such-binary-for-tests", &[])
            .unwrap_err();
        assert!(matches!(err, DockhandError::Spawn { .. }));
    }
}
