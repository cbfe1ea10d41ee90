//! Domain primitive types used across the dockhand workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DockhandError, Result};

/// The three kinds of declarable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A container image (pulled, built, or loaded).
    Image,
    /// A named container.
    Run,
    /// A command executed inside a running container.
    Exec,
}

impl ResourceKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 3] = [Self::Image, Self::Run, Self::Exec];

    /// Canonical capitalized name used in `Kind[id]` references.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Run => "Run",
            Self::Exec => "Exec",
        }
    }

    fn parse_loose(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a resource within one convergence run: the `(kind, id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Declared identifier, unique per kind.
    pub id: String,
}

impl ResourceKey {
    /// Creates a key from its parts.
    #[must_use]
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.id)
    }
}

/// A relation target as written in a manifest, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// `Kind[id]` or `kind:id`.
    Qualified(ResourceKey),
    /// A bare id; resolves only if exactly one declared resource carries it.
    Bare(String),
}

impl FromStr for ResourceRef {
    type Err = DockhandError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DockhandError::validation(
                "relation",
                "empty resource reference",
            ));
        }

        if let Some(open) = s.find('[') {
            if let Some(inner) = s[open + 1..].strip_suffix(']') {
                let Some(kind) = ResourceKind::parse_loose(&s[..open]) else {
                    return Err(DockhandError::validation(
                        "relation",
                        format!("unknown resource kind in reference \"{s}\""),
                    ));
                };
                if inner.is_empty() {
                    return Err(DockhandError::validation(
                        "relation",
                        format!("reference \"{s}\" has an empty id"),
                    ));
                }
                return Ok(Self::Qualified(ResourceKey::new(kind, inner)));
            }
        }

        if let Some((prefix, rest)) = s.split_once(':') {
            if let Some(kind) = ResourceKind::parse_loose(prefix) {
                if !rest.is_empty() {
                    return Ok(Self::Qualified(ResourceKey::new(kind, rest)));
                }
            }
        }

        Ok(Self::Bare(s.to_string()))
    }
}

/// A runtime-safe container name.
///
/// The runtime accepts `[A-Za-z0-9][A-Za-z0-9_.-]*`; anything else in a
/// declared id is replaced with `-` and leading separators are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerName(String);

impl ContainerName {
    /// Sanitizes a declared name into a container name.
    ///
    /// # Errors
    ///
    /// Returns a validation error if nothing usable remains.
    pub fn new(raw: &str) -> Result<Self> {
        let mapped: String = raw
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        let name = mapped.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
        if name.is_empty() {
            return Err(DockhandError::validation(
                raw,
                "does not contain any character usable in a container name",
            ));
        }
        Ok(Self(name.to_string()))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A content-addressed image digest (`sha256:<64 hex>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDigest(String);

impl ImageDigest {
    /// Parses a digest string.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is `sha256:` followed by exactly
    /// 64 hex characters.
    pub fn parse(digest: &str) -> Result<Self> {
        let hex = digest.strip_prefix("sha256:").unwrap_or_default();
        if hex.len() != crate::constants::SHA256_HEX_LENGTH
            || !hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(DockhandError::validation(
                "digest",
                format!("invalid image digest \"{digest}\" (expected sha256:<64 hex>)"),
            ));
        }
        Ok(Self(digest.to_string()))
    }

    /// Returns the full `sha256:...` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operating-system family reported by the fact provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Linux distributions.
    Linux,
    /// Windows hosts.
    Windows,
    /// macOS hosts.
    Darwin,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Windows => write!(f, "windows"),
            Self::Darwin => write!(f, "darwin"),
        }
    }
}

impl FromStr for OsFamily {
    type Err = DockhandError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            "darwin" | "macos" => Ok(Self::Darwin),
            other => Err(DockhandError::Config {
                message: format!("unknown OS family \"{other}\""),
            }),
        }
    }
}
