//! Typed resources produced by validation.
//!
//! Everything here has already passed its schema checks: sources are
//! mutually exclusive, relations point at declared resources, and the
//! `ensure`/`running` axes are reconciled into one enum per kind.

use std::path::PathBuf;

use dockhand_common::types::{ContainerName, ImageDigest, ResourceKey, ResourceKind};

/// A validated set of resources in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Resources, in the order they were declared.
    pub resources: Vec<Resource>,
}

impl Catalog {
    /// Position of a resource by key.
    #[must_use]
    pub fn position(&self, key: &ResourceKey) -> Option<usize> {
        self.resources.iter().position(|r| r.key == *key)
    }

    /// Looks up a resource by key.
    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.iter().find(|r| r.key == *key)
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the catalog declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// One resource and its resolved relations.
#[derive(Debug, Clone)]
pub struct Resource {
    /// `(kind, id)` identity.
    pub key: ResourceKey,
    /// Kind-specific desired state.
    pub spec: ResourceSpec,
    /// Resources that must converge first (explicit and implied).
    pub depends_on: Vec<ResourceKey>,
    /// Resources to refresh when this one changes (including those that
    /// declared a `subscribes` on it).
    pub notifies: Vec<ResourceKey>,
}

impl Resource {
    /// The runtime object this resource touches, used to serialize
    /// concurrent commands (`image:<name>` or `container:<name>`).
    #[must_use]
    pub fn lock_key(&self) -> String {
        match &self.spec {
            ResourceSpec::Image(i) => format!("image:{}", i.name),
            ResourceSpec::Run(r) => format!("container:{}", r.name),
            ResourceSpec::Exec(e) => format!("container:{}", e.container),
        }
    }
}

/// Desired state, per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpec {
    /// An image.
    Image(ImageSpec),
    /// A container.
    Run(RunSpec),
    /// A command inside a container.
    Exec(ExecSpec),
}

impl ResourceSpec {
    /// Kind of this spec.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Image(_) => ResourceKind::Image,
            Self::Run(_) => ResourceKind::Run,
            Self::Exec(_) => ResourceKind::Exec,
        }
    }
}

/// Desired image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    /// Repository name (`alpine`, `registry.local/app`).
    pub name: String,
    /// Where the image content comes from.
    pub source: ImageSource,
    /// Desired presence.
    pub ensure: ImageEnsure,
}

impl ImageSpec {
    /// Reference used to query and pull the image: `name`, `name:tag`, or
    /// `name@digest`.
    #[must_use]
    pub fn reference(&self) -> String {
        match &self.source {
            ImageSource::Registry { tag: Some(tag) } => format!("{}:{tag}", self.name),
            ImageSource::Digest(digest) => format!("{}@{digest}", self.name),
            ImageSource::Registry { tag: None }
            | ImageSource::Dockerfile(_)
            | ImageSource::Tarball(_) => self.name.clone(),
        }
    }
}

/// Image content origin. Exactly one drives pull/build/load semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Pull from a registry, optionally at a tag.
    Registry {
        /// Tag to pull; the runtime default when absent.
        tag: Option<String>,
    },
    /// Pull an immutable digest.
    Digest(ImageDigest),
    /// Build from a Dockerfile; its directory is the build context.
    Dockerfile(PathBuf),
    /// Load a saved image archive.
    Tarball(PathBuf),
}

/// Desired image presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEnsure {
    /// Pull/build/load if missing.
    Present,
    /// Remove if present.
    Absent,
    /// Pull on every run; changed only when the image id moves.
    Latest,
}

/// Desired container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Container name.
    pub name: ContainerName,
    /// Image reference; always set unless `ensure` is absent.
    pub image: Option<String>,
    /// Command arguments appended after the image.
    pub command: Vec<String>,
    /// Published ports.
    pub ports: Vec<String>,
    /// Exposed-only ports.
    pub expose: Vec<String>,
    /// Volume mounts.
    pub volumes: Vec<String>,
    /// Hostname inside the container.
    pub hostname: Option<String>,
    /// CPUs the container may use.
    pub cpuset: Vec<String>,
    /// Legacy links.
    pub links: Vec<String>,
    /// Environment variables.
    pub env: Vec<String>,
    /// Restart policy.
    pub restart: Option<String>,
    /// Desired presence and running flag.
    pub ensure: RunEnsure,
}

/// Presence and running flag of a container: two orthogonal axes, with
/// the running flag only meaningful while present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnsure {
    /// The container exists; `running` selects started or stopped.
    Present {
        /// Whether the container should be running.
        running: bool,
    },
    /// The container does not exist.
    Absent,
}

/// Desired one-off command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    /// Target container.
    pub container: ContainerName,
    /// Command to run.
    pub command: ExecCommand,
    /// Allocate a pseudo-TTY.
    pub tty: bool,
    /// Keep stdin open.
    pub interactive: bool,
    /// Run detached.
    pub detach: bool,
    /// Only run when a notifying resource changed.
    pub refreshonly: bool,
    /// Guard; skip when it exits 0 inside the container.
    pub unless: Option<ExecCommand>,
}

/// How an exec command reaches the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecCommand {
    /// Interpreted by the platform shell inside the container.
    Shell(String),
    /// Passed verbatim.
    Argv(Vec<String>),
}

impl std::fmt::Display for ExecCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shell(line) => f.write_str(line),
            Self::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}
