//! Raw declarations as written in a manifest, before validation.

use std::path::PathBuf;

use serde::Deserialize;

/// Root node of a parsed manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestFile {
    /// Resource declarations, in declaration order.
    #[serde(default)]
    pub resources: Vec<Declaration>,
}

/// One resource declaration, tagged by its `kind` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Declaration {
    /// `kind: image`
    Image(ImageDecl),
    /// `kind: run`
    Run(RunDecl),
    /// `kind: exec`
    Exec(ExecDecl),
}

/// Accepted values of the `ensure` key across all kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    /// The object should exist.
    Present,
    /// The object should not exist.
    Absent,
    /// Run only: exists and is running.
    Running,
    /// Run only: exists and is stopped.
    Stopped,
    /// Image only: exists and tracks the newest registry content.
    Latest,
}

/// A `command` given as one string or as an argument list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// `command: "touch /root/file"`
    Line(String),
    /// `command: ["touch", "/root/file"]`
    Argv(Vec<String>),
}

/// A scalar-or-list field; numbers and booleans are stringified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "ValuesRepr")]
pub struct Values(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ValuesRepr {
    One(Scalar),
    Many(Vec<Scalar>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Text(t) => t,
            Scalar::Int(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

impl From<ValuesRepr> for Values {
    fn from(repr: ValuesRepr) -> Self {
        match repr {
            ValuesRepr::One(s) => Self(vec![s.into()]),
            ValuesRepr::Many(v) => Self(v.into_iter().map(Into::into).collect()),
        }
    }
}

/// `kind: image`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageDecl {
    /// Declaration id; also the image name unless `image` is set.
    pub id: String,
    /// Image name override.
    pub image: Option<String>,
    /// Desired presence.
    pub ensure: Option<Ensure>,
    /// Registry tag to pull.
    #[serde(alias = "image_tag")]
    pub tag: Option<String>,
    /// Registry digest to pull.
    #[serde(alias = "image_digest")]
    pub digest: Option<String>,
    /// Dockerfile to build from.
    pub docker_file: Option<PathBuf>,
    /// Saved image archive to load.
    pub docker_tar: Option<PathBuf>,
    /// Resources that must converge first.
    #[serde(default, alias = "require")]
    pub depends_on: Values,
    /// Resources refreshed when this one changes.
    #[serde(default, alias = "notify")]
    pub notifies: Values,
    /// Resources whose changes refresh this one.
    #[serde(default, alias = "subscribe")]
    pub subscribes: Values,
}

/// `kind: run`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunDecl {
    /// Declaration id; sanitized into the container name.
    pub id: String,
    /// Desired presence.
    pub ensure: Option<Ensure>,
    /// Image to create the container from.
    pub image: Option<String>,
    /// Command passed to the container.
    pub command: Option<CommandLine>,
    /// Published ports (`4444` or `8080:80`).
    #[serde(default)]
    pub ports: Values,
    /// Exposed-only ports.
    #[serde(default)]
    pub expose: Values,
    /// Volume mounts (`/host:/container[:mode]`).
    #[serde(default)]
    pub volumes: Values,
    /// Container hostname.
    pub hostname: Option<String>,
    /// CPUs the container may run on.
    #[serde(default)]
    pub cpuset: Values,
    /// Legacy links (`name:alias`).
    #[serde(default)]
    pub links: Values,
    /// Environment (`KEY=value`).
    #[serde(default)]
    pub env: Values,
    /// Restart policy.
    pub restart: Option<String>,
    /// Containers this one is started after.
    #[serde(default)]
    pub depends: Values,
    /// Whether the container should be running.
    pub running: Option<bool>,
    /// Resources that must converge first.
    #[serde(default, alias = "require")]
    pub depends_on: Values,
    /// Resources refreshed when this one changes.
    #[serde(default, alias = "notify")]
    pub notifies: Values,
    /// Resources whose changes refresh this one.
    #[serde(default, alias = "subscribe")]
    pub subscribes: Values,
}

/// `kind: exec`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecDecl {
    /// Declaration id.
    pub id: String,
    /// Desired presence; only `present` is meaningful.
    pub ensure: Option<Ensure>,
    /// Target container name.
    pub container: Option<String>,
    /// Command to run inside the container.
    pub command: Option<CommandLine>,
    /// Allocate a pseudo-TTY.
    #[serde(default)]
    pub tty: bool,
    /// Keep stdin open.
    #[serde(default)]
    pub interactive: bool,
    /// Run the command in the background.
    #[serde(default)]
    pub detach: bool,
    /// Only run when notified by a changed resource.
    #[serde(default)]
    pub refreshonly: bool,
    /// Guard command; the exec is skipped when it exits 0.
    pub unless: Option<CommandLine>,
    /// Resources that must converge first.
    #[serde(default, alias = "require")]
    pub depends_on: Values,
    /// Resources refreshed when this one changes.
    #[serde(default, alias = "notify")]
    pub notifies: Values,
    /// Resources whose changes refresh this one.
    #[serde(default, alias = "subscribe")]
    pub subscribes: Values,
}

/// Borrowed view of the relation fields shared by every declaration.
#[derive(Debug, Clone, Copy)]
pub struct Relations<'a> {
    /// `depends_on` / `require`
    pub depends_on: &'a [String],
    /// `notifies` / `notify`
    pub notifies: &'a [String],
    /// `subscribes` / `subscribe`
    pub subscribes: &'a [String],
}

impl Declaration {
    /// Declared id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Image(d) => &d.id,
            Self::Run(d) => &d.id,
            Self::Exec(d) => &d.id,
        }
    }

    /// Relation fields of the declaration.
    #[must_use]
    pub fn relations(&self) -> Relations<'_> {
        let (depends_on, notifies, subscribes) = match self {
            Self::Image(d) => (&d.depends_on, &d.notifies, &d.subscribes),
            Self::Run(d) => (&d.depends_on, &d.notifies, &d.subscribes),
            Self::Exec(d) => (&d.depends_on, &d.notifies, &d.subscribes),
        };
        Relations {
            depends_on: &depends_on.0,
            notifies: &notifies.0,
            subscribes: &subscribes.0,
        }
    }
}
