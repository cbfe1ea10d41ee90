//! `dockhand apply`: converge the runtime to a manifest.

use std::path::PathBuf;

use clap::Args;
use dockhand_common::constants::DEFAULT_MANIFEST;

use super::GlobalArgs;
use crate::output;

/// Arguments for the `apply` command.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to the manifest.
    #[arg(default_value = DEFAULT_MANIFEST)]
    pub manifest: PathBuf,
}

/// Executes the `apply` command.
///
/// Every resource is converged and reported; the exit code is `1` if any
/// of them failed.
///
/// # Errors
///
/// Returns an error if the configuration or manifest is invalid, or the
/// relations are cyclic. No runtime command has been issued in that case.
pub fn execute(args: &ApplyArgs, global: &GlobalArgs) -> anyhow::Result<u8> {
    let report = super::converge(global, &args.manifest, false)?;
    output::report(&report, global.format)?;
    Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}
