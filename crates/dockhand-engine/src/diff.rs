//! Pure diffing of desired against observed state.
//!
//! Nothing here touches the runtime: the scheduler observes first, then asks
//! [`diff`] for the minimal list of actions, then applies them in order.

use dockhand_manifest::model::{
    ExecSpec, ImageEnsure, ImageSource, ImageSpec, ResourceSpec, RunEnsure, RunSpec,
};
use dockhand_runtime::docker::config_fingerprint;
use dockhand_runtime::observed::{ContainerState, ImageState, Observed};

use crate::plan::Action;

/// Computes the actions that move `observed` to `spec`.
///
/// An empty result means the resource is already converged. An observation
/// of a different kind than the desired state yields no actions.
#[must_use]
pub fn diff(spec: &ResourceSpec, observed: &Observed) -> Vec<Action> {
    match (spec, observed) {
        (ResourceSpec::Image(spec), Observed::Image(state)) => diff_image(spec, state),
        (ResourceSpec::Run(spec), Observed::Container(state)) => diff_run(spec, state),
        (ResourceSpec::Exec(spec), Observed::Exec { guard_satisfied }) => {
            diff_exec(spec, *guard_satisfied)
        }
        _ => Vec::new(),
    }
}

fn diff_image(spec: &ImageSpec, state: &ImageState) -> Vec<Action> {
    let reference = spec.reference();
    match (spec.ensure, state) {
        (ImageEnsure::Present, ImageState::Absent) => vec![acquire(spec, reference)],
        (ImageEnsure::Latest, ImageState::Absent) => vec![Action::PullImage { reference }],
        (ImageEnsure::Latest, ImageState::Present { id }) => vec![Action::RefreshImage {
            reference,
            previous_id: id.clone(),
        }],
        (ImageEnsure::Absent, ImageState::Present { .. }) => {
            vec![Action::RemoveImage { reference }]
        }
        (ImageEnsure::Present, ImageState::Present { .. })
        | (ImageEnsure::Absent, ImageState::Absent) => Vec::new(),
    }
}

fn acquire(spec: &ImageSpec, reference: String) -> Action {
    match &spec.source {
        ImageSource::Registry { .. } | ImageSource::Digest(_) => Action::PullImage { reference },
        ImageSource::Dockerfile(path) => Action::BuildImage {
            reference,
            dockerfile: path.clone(),
        },
        ImageSource::Tarball(path) => Action::LoadImage {
            reference,
            archive: path.clone(),
        },
    }
}

fn diff_run(spec: &RunSpec, state: &ContainerState) -> Vec<Action> {
    let name = || spec.name.clone();
    match (spec.ensure, state) {
        (RunEnsure::Absent, ContainerState::Absent) => Vec::new(),
        (RunEnsure::Absent, ContainerState::Present(info)) => {
            let mut actions = Vec::with_capacity(2);
            if info.running {
                actions.push(Action::StopContainer { name: name() });
            }
            actions.push(Action::RemoveContainer { name: name() });
            actions
        }
        (RunEnsure::Present { running }, ContainerState::Absent) => {
            let mut actions = vec![Action::CreateContainer { name: name() }];
            if running {
                actions.push(Action::StartContainer { name: name() });
            }
            actions
        }
        (RunEnsure::Present { running }, ContainerState::Present(info)) => {
            let drifted = info
                .config_hash
                .as_deref()
                .is_some_and(|hash| hash != config_fingerprint(spec));
            if drifted {
                tracing::info!(container = %spec.name, "configuration changed, recreating");
                let mut actions = Vec::with_capacity(4);
                if info.running {
                    actions.push(Action::StopContainer { name: name() });
                }
                actions.push(Action::RemoveContainer { name: name() });
                actions.push(Action::CreateContainer { name: name() });
                if running {
                    actions.push(Action::StartContainer { name: name() });
                }
                return actions;
            }
            match (info.running, running) {
                (false, true) => vec![Action::StartContainer { name: name() }],
                (true, false) => vec![Action::StopContainer { name: name() }],
                _ => Vec::new(),
            }
        }
    }
}

fn diff_exec(spec: &ExecSpec, guard_satisfied: bool) -> Vec<Action> {
    if guard_satisfied {
        return Vec::new();
    }
    vec![Action::Exec {
        container: spec.container.clone(),
        command: spec.command.to_string(),
    }]
}
