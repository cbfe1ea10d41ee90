//! CLI command definitions and dispatch.

pub mod apply;
pub mod plan;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dockhand_common::config::DockhandConfig;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::OsFamily;
use dockhand_engine::cancel::CancelToken;
use dockhand_engine::{Engine, EngineOptions, RunReport};
use dockhand_manifest::model::Catalog;
use dockhand_manifest::parser::{parse_manifest, validator::compile};
use dockhand_runtime::docker::DockerCli;
use dockhand_runtime::executor::ProcessExecutor;
use dockhand_runtime::platform::{HostFacts, Platform};
use dockhand_runtime::retry::{RetryPolicy, RetryingExecutor};

use crate::output::Format;

/// Dockhand: converge declared containers against a runtime.
#[derive(Parser, Debug)]
#[command(name = "dockhand", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Flags accepted by every subcommand; each overrides the configuration file.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: `$HOME/.dockhand/config.yaml` if present).
    #[arg(long, global = true, env = "DOCKHAND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum resources converged at once.
    #[arg(long, global = true, env = "DOCKHAND_WORKERS")]
    pub workers: Option<usize>,

    /// Run-level timeout in seconds.
    #[arg(long, global = true, value_name = "SECS", env = "DOCKHAND_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Path to the container runtime CLI.
    #[arg(long, global = true, env = "DOCKHAND_RUNTIME")]
    pub runtime: Option<PathBuf>,

    /// OS family of the runtime host (`linux`, `windows`, `darwin`).
    #[arg(long, global = true, env = "DOCKHAND_OS_FAMILY")]
    pub os_family: Option<OsFamily>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t, env = "DOCKHAND_FORMAT")]
    pub format: Format,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Loads the configuration file and overlays the flags on it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be loaded or the
    /// merged values are out of range.
    pub fn resolve_config(&self) -> Result<DockhandConfig> {
        let mut config = match &self.config {
            Some(path) => DockhandConfig::load(path)?,
            None => DockhandConfig::discover()?,
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = Some(timeout);
        }
        if let Some(runtime) = &self.runtime {
            config.runtime_binary = Some(runtime.clone());
        }
        if let Some(os_family) = self.os_family {
            config.os_family = Some(os_family);
        }
        config.validate()?;
        tracing::debug!(?config, "configuration resolved");
        Ok(config)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Converge the runtime to the manifest.
    Apply(apply::ApplyArgs),
    /// Show the actions `apply` would take, without taking them.
    Plan(plan::PlanArgs),
    /// Check the manifest and print the convergence order.
    Validate(validate::ValidateArgs),
}

/// Dispatches the parsed CLI command and returns the process exit code.
///
/// # Errors
///
/// Returns an error if the command fails before producing a report.
pub fn execute(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Command::Apply(args) => apply::execute(&args, &cli.global),
        Command::Plan(args) => plan::execute(&args, &cli.global),
        Command::Validate(args) => validate::execute(&args, &cli.global),
    }
}

/// Reads, parses and validates a manifest.
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read, or a
/// validation error if its contents are invalid.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path).map_err(|e| DockhandError::Config {
        message: format!("cannot read manifest {}: {e}", path.display()),
    })?;
    let catalog = compile(&parse_manifest(&content)?)?;
    tracing::info!(manifest = %path.display(), resources = catalog.len(), "manifest loaded");
    Ok(catalog)
}

/// Wires the real runtime: platform detection, process executor, retries.
fn engine(config: &DockhandConfig, dry_run: bool) -> Engine {
    let platform = Platform::detect(&HostFacts, config);
    let executor = RetryingExecutor::new(ProcessExecutor, RetryPolicy::from(&config.retry));
    let docker = DockerCli::new(Arc::new(executor), platform);
    Engine::new(
        docker,
        EngineOptions {
            workers: config.workers,
            dry_run,
        },
    )
}

/// Runs the engine over `manifest`, cancelling on timeout or Ctrl+C.
fn converge(global: &GlobalArgs, manifest: &Path, dry_run: bool) -> anyhow::Result<RunReport> {
    let config = global.resolve_config()?;
    let catalog = Arc::new(load_catalog(manifest)?);
    let engine = engine(&config, dry_run);

    let cancel = CancelToken::with_timeout(config.timeout());
    let handle = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, finishing in-flight work");
        handle.cancel();
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(engine.run(catalog, &cancel))?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn flags_override_config_file() {
        let file = config_file("workers: 2\ntimeout_secs: 30\n");
        let global = GlobalArgs {
            config: Some(file.path().to_path_buf()),
            workers: Some(8),
            ..GlobalArgs::default()
        };
        let config = global.resolve_config().unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.timeout_secs, Some(30));
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let file = config_file("workers: 1\n");
        let global = GlobalArgs {
            config: Some(file.path().to_path_buf()),
            workers: Some(0),
            ..GlobalArgs::default()
        };
        let err = global.resolve_config().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn missing_manifest_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_catalog(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, DockhandError::Config { .. }));
    }

    #[test]
    fn invalid_manifest_is_a_validation_error() {
        let file = config_file("resources:\n  - kind: run\n    id: c1\n");
        let err = load_catalog(file.path()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn config_flag_selects_the_file() {
        let file = config_file("workers: 3\n");
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["dockhand", "validate", "--config", path]).unwrap();
        assert_eq!(cli.global.config.as_deref(), Some(file.path()));
        assert_eq!(cli.global.resolve_config().unwrap().workers, 3);
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dockhand", "apply", "site.yaml", "--workers", "1", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.global.workers, Some(1));
        assert_eq!(cli.global.format, Format::Json);
        assert!(matches!(cli.command, Command::Apply(_)));
    }
}
