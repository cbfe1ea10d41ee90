//! Global configuration model for dockhand runs.
//!
//! Values come from a YAML file (all keys optional) and are then overlaid by
//! command-line flags in the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{DockhandError, Result};
use crate::types::OsFamily;

/// Root configuration for a convergence run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DockhandConfig {
    /// Explicit path to the runtime CLI; looked up on `PATH` when unset.
    pub runtime_binary: Option<PathBuf>,
    /// Maximum number of resources converged concurrently.
    pub workers: usize,
    /// Run-level deadline in seconds; unscheduled resources are cancelled
    /// once it passes.
    pub timeout_secs: Option<u64>,
    /// Retry policy for transient runtime failures.
    pub retry: RetryConfig,
    /// Overrides the OS family reported by the host fact provider.
    pub os_family: Option<OsFamily>,
}

impl Default for DockhandConfig {
    fn default() -> Self {
        Self {
            runtime_binary: None,
            workers: constants::DEFAULT_WORKERS,
            timeout_secs: None,
            retry: RetryConfig::default(),
            os_family: None,
        }
    }
}

/// Bounded fixed-backoff retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per command, including the first one.
    pub attempts: u32,
    /// Delay between attempts in milliseconds.
    pub backoff_ms: u64,
    /// Stderr fragments that classify a failure as transient.
    pub transient_patterns: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            backoff_ms: constants::DEFAULT_RETRY_BACKOFF_MS,
            transient_patterns: constants::DEFAULT_TRANSIENT_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl DockhandConfig {
    /// Loads a configuration file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// contains out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| DockhandError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parses configuration from YAML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML or a value is out of range.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|e| DockhandError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the per-user file if it exists, else the defaults.
    ///
    /// An explicit file is chosen by the caller (the CLI's `--config` flag
    /// or `$DOCKHAND_CONFIG`) and loaded with [`DockhandConfig::load`].
    ///
    /// # Errors
    ///
    /// Returns an error if the per-user file exists but cannot be loaded.
    pub fn discover() -> Result<Self> {
        Self::load_if_present(constants::user_config_file().as_deref())
    }

    fn load_if_present(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error if `workers` or `retry.attempts` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DockhandError::Config {
                message: "workers must be at least 1".into(),
            });
        }
        if self.retry.attempts == 0 {
            return Err(DockhandError::Config {
                message: "retry.attempts must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Run-level deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DockhandConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, constants::DEFAULT_WORKERS);
        assert!(config.timeout().is_none());
        assert_eq!(config.retry.transient_patterns.len(), 2);
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(
            DockhandConfig::from_yaml("  \n").unwrap(),
            DockhandConfig::default()
        );
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = DockhandConfig::from_yaml("workers: 1\ntimeout_secs: 30\n").unwrap();
        assert_eq!(config.workers, 1);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn nested_retry_and_os_family() {
        let yaml = "retry:\n  attempts: 2\n  backoff_ms: 10\nos_family: windows\n";
        let config = DockhandConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retry.attempts, 2);
        assert_eq!(config.retry.backoff_ms, 10);
        assert_eq!(config.os_family, Some(OsFamily::Windows));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = DockhandConfig::from_yaml("workers: 0").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(DockhandConfig::from_yaml("wrokers: 3").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "workers: 2\n").expect("write");
        let config = DockhandConfig::load(&path).unwrap();
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn absent_user_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        assert_eq!(
            DockhandConfig::load_if_present(Some(&path)).unwrap(),
            DockhandConfig::default()
        );
        assert_eq!(
            DockhandConfig::load_if_present(None).unwrap(),
            DockhandConfig::default()
        );

        std::fs::write(&path, "workers: 3\n").expect("write");
        assert_eq!(DockhandConfig::load_if_present(Some(&path)).unwrap().workers, 3);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = DockhandConfig::load(Path::new("/nonexistent/dockhand.yaml")).unwrap_err();
        assert!(matches!(err, DockhandError::Io { .. }));
    }
}
