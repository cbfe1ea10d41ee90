//! `dockhand validate`: check a manifest and print the convergence order.

use std::path::PathBuf;

use clap::Args;
use dockhand_common::constants::DEFAULT_MANIFEST;
use dockhand_manifest::graph::DependencyGraph;

use super::GlobalArgs;
use crate::output;

/// Arguments for the `validate` command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the manifest.
    #[arg(default_value = DEFAULT_MANIFEST)]
    pub manifest: PathBuf,
}

/// Executes the `validate` command.
///
/// Parses the manifest, builds the dependency graph and resolves the
/// topological order. The runtime is never contacted.
///
/// # Errors
///
/// Returns a validation error for an invalid manifest, or a cycle error
/// naming the resources involved.
pub fn execute(args: &ValidateArgs, global: &GlobalArgs) -> anyhow::Result<u8> {
    let catalog = super::load_catalog(&args.manifest)?;
    let order = DependencyGraph::from_catalog(&catalog).resolve_order()?;
    output::order(&catalog, &order, global.format)?;
    Ok(0)
}
