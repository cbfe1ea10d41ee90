//! # dockhand-runtime
//!
//! Everything that talks to the container runtime.
//!
//! - **Executor**: the blocking `execute(program, args)` seam and its
//!   process-spawning implementation.
//! - **Retry**: bounded fixed-backoff retry of transient failures.
//! - **Platform**: OS facts turned into a binary name and exec shell.
//! - **Docker**: typed runtime commands built on an executor.
//! - **Observed**: the actual state the engine diffs against.
//! - **Fake**: an in-memory runtime for tests.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod docker;
pub mod executor;
pub mod fake;
pub mod observed;
pub mod platform;
pub mod retry;
