//! Bounded retry of transient runtime failures.
//!
//! A failure is transient when the command exits non-zero and its stderr
//! contains one of the configured patterns (by default the daemon's
//! "connection failure" messages). Transient failures are retried with a
//! fixed delay up to the attempt limit; every other outcome is returned
//! immediately.

use std::time::Duration;

use dockhand_common::config::RetryConfig;
use dockhand_common::error::Result;

use crate::executor::{CommandExecutor, CommandOutput, command_line};

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
    /// Lowercased stderr fragments that mark a failure as transient.
    patterns: Vec<String>,
}

impl RetryPolicy {
    /// Builds a policy; patterns match case-insensitively.
    #[must_use]
    pub fn new(attempts: u32, backoff: Duration, patterns: &[String]) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
            patterns: Vec::new(),
        }
    }

    /// Whether this output is a failure worth retrying.
    #[must_use]
    pub fn is_transient(&self, output: &CommandOutput) -> bool {
        if output.success() {
            return false;
        }
        let stderr = output.stderr.to_lowercase();
        self.patterns.iter().any(|p| stderr.contains(p))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.attempts,
            Duration::from_millis(config.backoff_ms),
            &config.transient_patterns,
        )
    }
}

/// Executor decorator that retries transient failures.
#[derive(Debug)]
pub struct RetryingExecutor<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: CommandExecutor> RetryingExecutor<E> {
    /// Wraps `inner` with `policy`.
    pub const fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped executor.
    pub const fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: CommandExecutor> CommandExecutor for RetryingExecutor<E> {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut attempt = 1;
        loop {
            let output = self.inner.execute(program, args)?;
            if attempt >= self.policy.attempts || !self.policy.is_transient(&output) {
                return Ok(output);
            }
            tracing::warn!(
                command = %command_line(program, args),
                attempt,
                max_attempts = self.policy.attempts,
                stderr = output.stderr.trim(),
                "transient runtime failure, retrying"
            );
            std::thread::sleep(self.policy.backoff);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Returns scripted outputs in order, then successes.
    struct Scripted {
        outputs: Mutex<Vec<CommandOutput>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut outputs: Vec<CommandOutput>) -> Self {
            outputs.reverse();
            Self {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl CommandExecutor for Scripted {
        fn execute(&self, _program: &str, _args: &[String]) -> Result<CommandOutput> {
            *self.calls.lock().unwrap() += 1;
            Ok(self
                .outputs
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| CommandOutput::ok("")))
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::from(&RetryConfig {
            attempts,
            backoff_ms: 0,
            ..RetryConfig::default()
        })
    }

    fn connection_failure() -> CommandOutput {
        CommandOutput::failed(1, "error during connect: connection failure running docker")
    }

    #[test]
    fn transient_classification_is_case_insensitive() {
        let p = policy(3);
        assert!(p.is_transient(&CommandOutput::failed(1, "Connection Failure")));
        assert!(p.is_transient(&CommandOutput::failed(
            1,
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock"
        )));
        assert!(!p.is_transient(&CommandOutput::failed(1, "No such container: c1")));
        assert!(!p.is_transient(&CommandOutput::ok("connection failure")));
    }

    #[test]
    fn retries_until_success() {
        let exec = RetryingExecutor::new(
            Scripted::new(vec![connection_failure(), connection_failure()]),
            policy(5),
        );
        let out = exec.execute("docker", &[]).unwrap();
        assert!(out.success());
        assert_eq!(exec.inner().calls(), 3);
    }

    #[test]
    fn gives_up_after_attempt_limit() {
        let exec = RetryingExecutor::new(
            Scripted::new(vec![connection_failure(); 4]),
            policy(3),
        );
        let out = exec.execute("docker", &[]).unwrap();
        assert!(!out.success());
        assert_eq!(exec.inner().calls(), 3);
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let exec = RetryingExecutor::new(
            Scripted::new(vec![CommandOutput::failed(125, "invalid reference format")]),
            policy(5),
        );
        let out = exec.execute("docker", &[]).unwrap();
        assert_eq!(out.exit_code, 125);
        assert_eq!(exec.inner().calls(), 1);
    }

    #[test]
    fn none_policy_runs_once() {
        let exec = RetryingExecutor::new(Scripted::new(vec![connection_failure()]), RetryPolicy::none());
        assert!(!exec.execute("docker", &[]).unwrap().success());
        assert_eq!(exec.inner().calls(), 1);
    }
}
