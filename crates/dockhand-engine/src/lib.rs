//! # dockhand-engine
//!
//! Drives a validated catalog to its desired state.
//!
//! - **Plan**: the corrective actions a diff can produce.
//! - **Diff**: pure `(desired, observed) -> actions`.
//! - **Notify**: the changed set and the refresh-only gate.
//! - **Outcome**: per-resource results and the run report.
//! - **Cancel**: run-level deadline and interrupt.
//! - **Engine**: the bounded, dependency-aware scheduler.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod cancel;
pub mod diff;
pub mod engine;
pub mod notify;
pub mod outcome;
pub mod plan;

pub use engine::{Engine, EngineOptions};
pub use outcome::{Failure, Outcome, ResourceReport, RunReport};
