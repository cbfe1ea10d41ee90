//! `dockhand plan`: show the actions `apply` would take.

use std::path::PathBuf;

use clap::Args;
use dockhand_common::constants::DEFAULT_MANIFEST;

use super::GlobalArgs;
use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the manifest.
    #[arg(default_value = DEFAULT_MANIFEST)]
    pub manifest: PathBuf,
}

/// Executes the `plan` command.
///
/// Observes and diffs every resource without applying anything. A
/// refresh-only exec is listed when a resource notifying it has planned
/// actions.
///
/// # Errors
///
/// Returns an error if the configuration or manifest is invalid, or the
/// relations are cyclic.
pub fn execute(args: &PlanArgs, global: &GlobalArgs) -> anyhow::Result<u8> {
    let report = super::converge(global, &args.manifest, true)?;
    output::report(&report, global.format)?;
    Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}
