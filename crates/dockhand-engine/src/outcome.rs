//! Per-resource outcomes and the run report.

use std::fmt;

use chrono::{DateTime, Utc};
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::ResourceKey;
use serde::Serialize;
use uuid::Uuid;

use crate::plan::Action;

/// Final state of one resource in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Already converged; nothing was done.
    Unchanged,
    /// Actions were applied (or, in a dry run, would be).
    Changed {
        /// Actions in the order they were applied.
        actions: Vec<Action>,
    },
    /// The resource did not converge.
    Failed {
        /// What went wrong.
        failure: Failure,
        /// Actions that succeeded before the failure; nothing is rolled back.
        applied: Vec<Action>,
    },
}

impl Outcome {
    /// A failure with no actions applied.
    #[must_use]
    pub const fn failed(failure: Failure) -> Self {
        Self::Failed {
            failure,
            applied: Vec::new(),
        }
    }

    /// Whether the outcome counts as `changed` for notifications.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    /// Whether the resource failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Actions that ran (or would run), in order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        match self {
            Self::Unchanged => &[],
            Self::Changed { actions } => actions,
            Self::Failed { applied, .. } => applied,
        }
    }
}

/// Why a resource failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// A runtime command exited non-zero.
    Execution {
        /// Attempted action.
        action: String,
        /// Full command line.
        command: String,
        /// Exit status.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },
    /// A dependency failed, so this resource was never attempted.
    DependencyFailed {
        /// The failed dependency.
        dependency: String,
    },
    /// The run was cancelled before this resource was dispatched.
    Cancelled {
        /// Deadline or interrupt.
        reason: String,
    },
    /// Any other error (spawn failure, unparsable runtime output).
    Error {
        /// Rendered error.
        message: String,
    },
}

impl From<DockhandError> for Failure {
    fn from(err: DockhandError) -> Self {
        match err {
            DockhandError::Execution {
                action,
                command,
                exit_code,
                stderr,
                ..
            } => Self::Execution {
                action,
                command,
                exit_code,
                stderr,
            },
            DockhandError::Timeout { reason, .. } => Self::Cancelled { reason },
            other => Self::Error {
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution {
                action,
                command,
                exit_code,
                stderr,
            } => write!(f, "{action} failed: `{command}` exited with {exit_code}: {stderr}"),
            Self::DependencyFailed { dependency } => write!(f, "dependency {dependency} failed"),
            Self::Cancelled { reason } => write!(f, "cancelled ({reason})"),
            Self::Error { message } => f.write_str(message),
        }
    }
}

/// Result for one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    /// Resource identity.
    pub resource: ResourceKey,
    /// What happened.
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Wall-clock time spent converging, in milliseconds.
    pub duration_ms: u64,
}

/// Everything a run did, in topological order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of the run, also recorded on its tracing span.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Whether actions were only planned.
    pub dry_run: bool,
    /// Per-resource results.
    pub resources: Vec<ResourceReport>,
}

impl RunReport {
    /// Every action of the run, flattened in report order and rendered as
    /// `verb object`.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.resources
            .iter()
            .flat_map(|r| r.outcome.actions().iter().map(ToString::to_string))
            .collect()
    }

    /// Outcome of one resource.
    #[must_use]
    pub fn outcome(&self, key: &ResourceKey) -> Option<&Outcome> {
        self.resources
            .iter()
            .find(|r| r.resource == *key)
            .map(|r| &r.outcome)
    }

    /// Number of changed resources.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.resources.iter().filter(|r| r.outcome.is_changed()).count()
    }

    /// Number of failed resources.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.resources.iter().filter(|r| r.outcome.is_failed()).count()
    }

    /// `1` if any resource failed, else `0`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed() > 0)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the report cannot be encoded.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use dockhand_common::types::{ContainerName, ResourceKind};

    use super::*;

    fn report(outcomes: Vec<Outcome>) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run: false,
            resources: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| ResourceReport {
                    resource: ResourceKey::new(ResourceKind::Run, format!("c{i}")),
                    outcome,
                    duration_ms: 0,
                })
                .collect(),
        }
    }

    fn start(name: &str) -> Action {
        Action::StartContainer {
            name: ContainerName::new(name).unwrap(),
        }
    }

    #[test]
    fn exit_code_reflects_failures() {
        assert_eq!(report(vec![Outcome::Unchanged]).exit_code(), 0);
        let failed = report(vec![
            Outcome::Unchanged,
            Outcome::failed(Failure::Cancelled {
                reason: "interrupted".into(),
            }),
        ]);
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(failed.failed(), 1);
    }

    #[test]
    fn actions_flatten_in_order_including_partial_failures() {
        let r = report(vec![
            Outcome::Changed {
                actions: vec![start("a")],
            },
            Outcome::Failed {
                failure: Failure::Error {
                    message: "boom".into(),
                },
                applied: vec![start("b")],
            },
        ]);
        assert_eq!(r.actions(), vec!["start a", "start b"]);
        assert_eq!(r.changed(), 1);
    }

    #[test]
    fn execution_error_converts_to_failure() {
        let err = DockhandError::Execution {
            resource: "Run[c1]".into(),
            action: "start c1".into(),
            command: "docker start c1".into(),
            exit_code: 1,
            stderr: "boom".into(),
        };
        let failure = Failure::from(err);
        assert_eq!(
            failure.to_string(),
            "start c1 failed: `docker start c1` exited with 1: boom"
        );
    }

    #[test]
    fn timeout_error_converts_to_cancelled() {
        let failure = Failure::from(DockhandError::Timeout {
            resource: "Run[c1]".into(),
            reason: "run timeout exceeded".into(),
        });
        assert!(matches!(failure, Failure::Cancelled { .. }));
    }

    #[test]
    fn json_report_is_tagged() {
        let json = report(vec![Outcome::Changed {
            actions: vec![start("a")],
        }])
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["resources"][0]["status"], "changed");
        assert_eq!(value["resources"][0]["actions"][0]["action"], "start_container");
        assert_eq!(value["resources"][0]["resource"]["kind"], "run");
    }

    #[test]
    fn json_failure_keeps_its_reason() {
        let json = report(vec![Outcome::failed(Failure::Cancelled {
            reason: "interrupted".into(),
        })])
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let failure = &value["resources"][0]["failure"];
        assert_eq!(value["resources"][0]["status"], "failed");
        assert_eq!(failure["kind"], "cancelled");
        assert_eq!(failure["reason"], "interrupted");
    }
}
