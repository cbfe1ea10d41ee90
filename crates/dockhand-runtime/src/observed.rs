//! Actual state of runtime objects, as seen right before a diff.

use dockhand_common::error::Result;
use dockhand_manifest::model::{Resource, ResourceSpec};

use crate::docker::DockerCli;

/// Observed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
    /// Not present locally.
    Absent,
    /// Present locally.
    Present {
        /// Image id (`sha256:...`).
        id: String,
    },
}

/// Observed container details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container id.
    pub id: String,
    /// Whether the container's main process is running.
    pub running: bool,
    /// Image the container was created from.
    pub image: String,
    /// Configuration fingerprint label, if dockhand created the container.
    pub config_hash: Option<String>,
}

/// Observed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// No container with that name.
    Absent,
    /// A container with that name exists.
    Present(ContainerInfo),
}

/// Observed state for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// State of an image resource.
    Image(ImageState),
    /// State of a run resource.
    Container(ContainerState),
    /// State of an exec resource.
    Exec {
        /// Whether the `unless` guard exited 0; `false` without a guard.
        guard_satisfied: bool,
    },
}

/// Queries the runtime for the state `resource` describes.
///
/// Exec guards run inside the target container; a missing container
/// counts as an unsatisfied guard.
///
/// # Errors
///
/// Returns an error if an inspect command fails for a reason other than
/// the object not existing.
pub fn observe(docker: &DockerCli, resource: &Resource) -> Result<Observed> {
    let observed = match &resource.spec {
        ResourceSpec::Image(spec) => {
            Observed::Image(docker.inspect_image(&resource.key, &spec.reference())?)
        }
        ResourceSpec::Run(spec) => {
            Observed::Container(docker.inspect_container(&resource.key, &spec.name)?)
        }
        ResourceSpec::Exec(spec) => {
            let guard_satisfied = match &spec.unless {
                Some(guard) => docker.guard(&resource.key, &spec.container, guard)?,
                None => false,
            };
            Observed::Exec { guard_satisfied }
        }
    };
    tracing::trace!(resource = %resource.key, ?observed, "observed");
    Ok(observed)
}
