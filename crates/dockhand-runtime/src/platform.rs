//! Host facts and the platform strategy derived from them.
//!
//! The runtime command layer never branches on `cfg!(target_os)`: it asks a
//! [`Platform`] for the binary to invoke and the shell to wrap exec command
//! strings in. The platform is built from a [`FactProvider`], which tests can
//! replace.

use std::path::PathBuf;

use dockhand_common::config::DockhandConfig;
use dockhand_common::types::OsFamily;

/// Reports facts about the host.
pub trait FactProvider: Send + Sync {
    /// OS family of the host the runtime commands target.
    fn os_family(&self) -> OsFamily;
}

/// Facts about the machine dockhand runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFacts;

impl FactProvider for HostFacts {
    fn os_family(&self) -> OsFamily {
        match std::env::consts::OS {
            "windows" => OsFamily::Windows,
            "macos" => OsFamily::Darwin,
            _ => OsFamily::Linux,
        }
    }
}

/// Facts fixed up front; used for configuration overrides and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticFacts(pub OsFamily);

impl FactProvider for StaticFacts {
    fn os_family(&self) -> OsFamily {
        self.0
    }
}

/// Platform-specific choices for the runtime command layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    os_family: OsFamily,
    binary: String,
}

impl Platform {
    /// Platform with the default binary name for `os_family`.
    #[must_use]
    pub fn new(os_family: OsFamily) -> Self {
        Self {
            os_family,
            binary: default_binary(os_family).to_string(),
        }
    }

    /// Resolves the platform for a run.
    ///
    /// The configured OS family wins over the fact provider. A configured
    /// runtime binary is used verbatim; otherwise the default name is looked
    /// up on `PATH` and, if not found, left bare so the spawn error names it.
    #[must_use]
    pub fn detect(facts: &dyn FactProvider, config: &DockhandConfig) -> Self {
        let os_family = config.os_family.unwrap_or_else(|| facts.os_family());
        let binary = config.runtime_binary.as_ref().map_or_else(
            || locate(default_binary(os_family)),
            |path| path.display().to_string(),
        );
        tracing::debug!(%os_family, binary = %binary, "platform resolved");
        Self { os_family, binary }
    }

    /// Replaces the runtime binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// OS family this platform targets.
    #[must_use]
    pub const fn os_family(&self) -> OsFamily {
        self.os_family
    }

    /// Program to invoke for runtime commands.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Wraps a command string in the platform shell.
    #[must_use]
    pub fn shell_wrap(&self, line: &str) -> Vec<String> {
        let (shell, flag) = match self.os_family {
            OsFamily::Windows => ("cmd", "/c"),
            OsFamily::Linux | OsFamily::Darwin => ("/bin/sh", "-c"),
        };
        vec![shell.to_string(), flag.to_string(), line.to_string()]
    }
}

/// Default runtime binary name per OS family.
#[must_use]
pub const fn default_binary(os_family: OsFamily) -> &'static str {
    match os_family {
        OsFamily::Windows => "docker.exe",
        OsFamily::Linux | OsFamily::Darwin => "docker",
    }
}

fn locate(name: &str) -> String {
    which::which(name).map_or_else(
        |_| name.to_string(),
        |path: PathBuf| path.display().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_shell_wrap() {
        let platform = Platform::new(OsFamily::Linux);
        assert_eq!(
            platform.shell_wrap("touch /root/a"),
            vec!["/bin/sh", "-c", "touch /root/a"]
        );
        assert_eq!(platform.binary(), "docker");
    }

    #[test]
    fn windows_shell_wrap_and_binary() {
        let platform = Platform::new(OsFamily::Windows);
        assert_eq!(
            platform.shell_wrap("echo hi > C:\\a.txt"),
            vec!["cmd", "/c", "echo hi > C:\\a.txt"]
        );
        assert_eq!(platform.binary(), "docker.exe");
    }

    #[test]
    fn config_overrides_facts_and_binary() {
        let config = DockhandConfig {
            os_family: Some(OsFamily::Windows),
            runtime_binary: Some(PathBuf::from("/opt/bin/podman")),
            ..DockhandConfig::default()
        };
        let platform = Platform::detect(&StaticFacts(OsFamily::Linux), &config);
        assert_eq!(platform.os_family(), OsFamily::Windows);
        assert_eq!(platform.binary(), "/opt/bin/podman");
    }

    #[test]
    fn facts_used_without_override() {
        let config = DockhandConfig {
            runtime_binary: Some(PathBuf::from("docker")),
            ..DockhandConfig::default()
        };
        let platform = Platform::detect(&StaticFacts(OsFamily::Darwin), &config);
        assert_eq!(platform.os_family(), OsFamily::Darwin);
    }

    #[test]
    fn host_facts_match_build_target() {
        let expected = if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::Darwin
        } else {
            OsFamily::Linux
        };
        assert_eq!(HostFacts.os_family(), expected);
    }

    #[test]
    fn with_binary_replaces_program() {
        let platform = Platform::new(OsFamily::Linux).with_binary("fake-docker");
        assert_eq!(platform.binary(), "fake-docker");
    }
}
