//! Unified error types for the dockhand workspace.
//!
//! Errors fall into two classes: those refused before any runtime command
//! runs (validation, cycles, configuration) and those raised while a run is
//! in progress (execution failures, cancellation, process spawning).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum DockhandError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The runtime binary could not be started at all.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A resource declaration does not satisfy its schema.
    #[error("invalid resource {resource}: {message}")]
    Validation {
        /// Resource the problem was found on (`Kind[id]` or a position).
        resource: String,
        /// Description of the violation.
        message: String,
    },

    /// The declared relations form a cycle.
    #[error("dependency cycle detected: {}", resources.join(" -> "))]
    Cycle {
        /// Resources participating in the cycle, in edge order.
        resources: Vec<String>,
    },

    /// A runtime command returned a non-zero exit status.
    #[error("{resource}: {action} failed: `{command}` exited with {exit_code}: {stderr}")]
    Execution {
        /// Resource whose action failed.
        resource: String,
        /// Attempted action (e.g. `start c1`).
        action: String,
        /// Full command line that was executed.
        command: String,
        /// Exit status reported by the executor.
        exit_code: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The run was cancelled before the resource could be applied.
    #[error("{resource}: cancelled ({reason})")]
    Timeout {
        /// Resource that was never scheduled.
        resource: String,
        /// Why the run stopped dispatching (deadline, interrupt).
        reason: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl DockhandError {
    /// Returns the process exit code this error maps to.
    ///
    /// Errors detected before any action was taken map to `2`; everything
    /// raised during a run maps to `1`.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::Validation { .. } | Self::Cycle { .. } => 2,
            _ => 1,
        }
    }

    /// Shorthand for a [`DockhandError::Validation`].
    pub fn validation(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DockhandError>;
