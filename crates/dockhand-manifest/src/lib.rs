//! # dockhand-manifest
//!
//! Turns declarative resource manifests into a validated, ordered catalog.
//!
//! Handles:
//! - **Parser**: YAML/JSON declarations into a raw AST.
//! - **Validator**: per-kind schema checks and relation resolution.
//! - **Model**: the typed resources the engine converges.
//! - **Graph**: dependency graph construction and deterministic ordering.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod graph;
pub mod model;
pub mod parser;

use std::path::Path;

use dockhand_common::error::{DockhandError, Result};

use crate::model::Catalog;

/// Reads, parses, and validates a manifest file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or a validation error if
/// it does not describe a valid resource set.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    tracing::info!(path = %path.display(), "loading manifest");
    let content = std::fs::read_to_string(path).map_err(|e| DockhandError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file = parser::parse_manifest(&content)?;
    parser::validator::compile(&file)
}
