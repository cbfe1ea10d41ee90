//! Corrective actions produced by a diff.

use std::fmt;
use std::path::PathBuf;

use dockhand_common::types::ContainerName;
use serde::Serialize;

/// One step towards the desired state of a resource.
///
/// Actions for a single resource are applied in the order the diff emits
/// them: stop before remove, create before start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Pull a missing image from its registry.
    PullImage {
        /// Reference to pull.
        reference: String,
    },
    /// Build a missing image from a Dockerfile.
    BuildImage {
        /// Tag for the built image.
        reference: String,
        /// Dockerfile path.
        dockerfile: PathBuf,
    },
    /// Load a missing image from an archive.
    LoadImage {
        /// Image the archive is expected to provide.
        reference: String,
        /// Archive path.
        archive: PathBuf,
    },
    /// Pull a present image again; changes only if its id moves.
    RefreshImage {
        /// Reference to pull.
        reference: String,
        /// Id before the pull.
        previous_id: String,
    },
    /// Remove a present image.
    RemoveImage {
        /// Reference to remove.
        reference: String,
    },
    /// Create a container from the resource's configuration.
    CreateContainer {
        /// Container name.
        name: ContainerName,
    },
    /// Start a stopped container.
    StartContainer {
        /// Container name.
        name: ContainerName,
    },
    /// Stop a running container.
    StopContainer {
        /// Container name.
        name: ContainerName,
    },
    /// Remove a stopped container.
    RemoveContainer {
        /// Container name.
        name: ContainerName,
    },
    /// Run a command inside a container.
    Exec {
        /// Target container.
        container: ContainerName,
        /// Command as written.
        command: String,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PullImage { reference } => write!(f, "pull {reference}"),
            Self::BuildImage { reference, .. } => write!(f, "build {reference}"),
            Self::LoadImage { reference, .. } => write!(f, "load {reference}"),
            Self::RefreshImage { reference, .. } => write!(f, "refresh {reference}"),
            Self::RemoveImage { reference } => write!(f, "remove {reference}"),
            Self::CreateContainer { name } => write!(f, "create {name}"),
            Self::StartContainer { name } => write!(f, "start {name}"),
            Self::StopContainer { name } => write!(f, "stop {name}"),
            Self::RemoveContainer { name } => write!(f, "remove {name}"),
            Self::Exec { container, command } => write!(f, "exec {container}: {command}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> ContainerName {
        ContainerName::new(n).unwrap()
    }

    #[test]
    fn display_is_verb_and_object() {
        let rendered: Vec<String> = [
            Action::PullImage {
                reference: "alpine".into(),
            },
            Action::CreateContainer { name: name("c1") },
            Action::StartContainer { name: name("c1") },
            Action::StopContainer { name: name("c1") },
            Action::RemoveContainer { name: name("c1") },
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            rendered,
            vec!["pull alpine", "create c1", "start c1", "stop c1", "remove c1"]
        );
    }

    #[test]
    fn exec_display_names_container_and_command() {
        let action = Action::Exec {
            container: name("c1"),
            command: "touch /root/file".into(),
        };
        assert_eq!(action.to_string(), "exec c1: touch /root/file");
    }

    #[test]
    fn serializes_with_action_tag() {
        let json = serde_json::to_value(Action::RemoveImage {
            reference: "alpine:3.7".into(),
        })
        .unwrap();
        assert_eq!(json["action"], "remove_image");
        assert_eq!(json["reference"], "alpine:3.7");
    }
}
