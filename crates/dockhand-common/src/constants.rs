//! System-wide constants and default paths.

use std::path::PathBuf;

/// Application name used in CLI output and labels.
pub const APP_NAME: &str = "dockhand";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "dockhand";

/// Manifest file read when none is given on the command line.
pub const DEFAULT_MANIFEST: &str = "dockhand.yaml";

/// Container label holding the SHA-256 fingerprint of the run configuration.
pub const CONFIG_HASH_LABEL: &str = "dockhand.config-hash";

/// Container label naming the declaration that created the container.
pub const RESOURCE_LABEL: &str = "dockhand.resource";

/// Default number of resources converged concurrently.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of attempts for a transiently failing command.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Default fixed delay between retry attempts, in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;

/// Stderr fragments that mark a failure as transient.
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    "connection failure",
    "Cannot connect to the Docker daemon",
];

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Returns the per-user configuration file (`$HOME/.dockhand/config.yaml`),
/// if a home directory is known.
pub fn user_config_file() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(|home| PathBuf::from(home).join(".dockhand").join("config.yaml"))
}
