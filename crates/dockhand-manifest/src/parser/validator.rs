//! Static analysis of parsed declarations.
//!
//! Checks per-kind schemas, duplicate identities, and relation targets, and
//! compiles the result into a [`Catalog`] before anything is executed.

use std::collections::HashSet;

use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::{
    ContainerName, ImageDigest, ResourceKey, ResourceKind, ResourceRef,
};

use super::ast::{CommandLine, Declaration, Ensure, ExecDecl, ImageDecl, ManifestFile, RunDecl};
use crate::model::{
    Catalog, ExecCommand, ExecSpec, ImageEnsure, ImageSource, ImageSpec, Resource, ResourceSpec,
    RunEnsure, RunSpec,
};

/// Validates a parsed manifest and compiles it into a catalog.
///
/// # Checks performed
///
/// 1. Every declaration has a non-empty id, unique within its kind.
/// 2. Each kind's schema holds (mutually exclusive image sources, required
///    `Run.image`, compatible `ensure`/`running`, required exec fields).
/// 3. No two containers sanitize to the same name.
/// 4. Every relation resolves to exactly one declared resource.
///
/// Implied relations (a container's image, linked containers, an exec's
/// target container) are added after explicit ones.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn compile(file: &ManifestFile) -> Result<Catalog> {
    tracing::info!(declarations = file.resources.len(), "validating manifest");

    let mut resources = Vec::with_capacity(file.resources.len());
    for (position, decl) in file.resources.iter().enumerate() {
        resources.push(build_resource(position, decl)?);
    }
    check_duplicate_keys(&resources)?;
    check_container_collisions(&resources)?;

    let keys: Vec<ResourceKey> = resources.iter().map(|r| r.key.clone()).collect();
    for (i, decl) in file.resources.iter().enumerate() {
        let relations = decl.relations();
        let owner = &keys[i];
        resources[i].depends_on = resolve_all(&keys, owner, relations.depends_on)?;
        resources[i].notifies = resolve_all(&keys, owner, relations.notifies)?;
    }
    // Subscriptions land on the source, which may be declared later.
    for (i, decl) in file.resources.iter().enumerate() {
        let owner = &keys[i];
        for source in resolve_all(&keys, owner, decl.relations().subscribes)? {
            if let Some(pos) = keys.iter().position(|k| *k == source) {
                push_unique(&mut resources[pos].notifies, owner.clone());
            }
        }
    }

    add_implied_dependencies(file, &mut resources);
    Ok(Catalog { resources })
}

fn build_resource(position: usize, decl: &Declaration) -> Result<Resource> {
    if decl.id().trim().is_empty() {
        return Err(DockhandError::validation(
            format!("resources[{position}]"),
            "id must not be empty",
        ));
    }
    let spec = match decl {
        Declaration::Image(d) => ResourceSpec::Image(build_image(d)?),
        Declaration::Run(d) => ResourceSpec::Run(build_run(d)?),
        Declaration::Exec(d) => ResourceSpec::Exec(build_exec(d)?),
    };
    Ok(Resource {
        key: ResourceKey::new(spec.kind(), decl.id()),
        spec,
        depends_on: Vec::new(),
        notifies: Vec::new(),
    })
}

fn build_image(d: &ImageDecl) -> Result<ImageSpec> {
    let owner = ResourceKey::new(ResourceKind::Image, &d.id).to_string();
    let name = d.image.clone().unwrap_or_else(|| d.id.clone());
    if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
        return Err(DockhandError::validation(
            owner,
            format!("\"{name}\" is not a valid image name"),
        ));
    }

    let set: Vec<&str> = [
        ("tag", d.tag.is_some()),
        ("digest", d.digest.is_some()),
        ("docker_file", d.docker_file.is_some()),
        ("docker_tar", d.docker_tar.is_some()),
    ]
    .into_iter()
    .filter_map(|(field, present)| present.then_some(field))
    .collect();
    if set.len() > 1 {
        return Err(DockhandError::validation(
            owner,
            format!(
                "only one of tag, digest, docker_file, docker_tar may be set (found {})",
                set.join(" and ")
            ),
        ));
    }

    let source = if let Some(tag) = &d.tag {
        if tag.trim().is_empty() {
            return Err(DockhandError::validation(owner, "tag must not be empty"));
        }
        ImageSource::Registry {
            tag: Some(tag.clone()),
        }
    } else if let Some(digest) = &d.digest {
        let digest = ImageDigest::parse(digest).map_err(|e| rename(e, &owner))?;
        ImageSource::Digest(digest)
    } else if let Some(path) = &d.docker_file {
        ImageSource::Dockerfile(path.clone())
    } else if let Some(path) = &d.docker_tar {
        ImageSource::Tarball(path.clone())
    } else {
        ImageSource::Registry { tag: None }
    };

    let ensure = match d.ensure {
        None | Some(Ensure::Present) => ImageEnsure::Present,
        Some(Ensure::Absent) => ImageEnsure::Absent,
        Some(Ensure::Latest) => {
            if !matches!(source, ImageSource::Registry { .. }) {
                return Err(DockhandError::validation(
                    owner,
                    "ensure `latest` requires a registry source (no digest, docker_file, or docker_tar)",
                ));
            }
            ImageEnsure::Latest
        }
        Some(other) => {
            return Err(DockhandError::validation(
                owner,
                format!("ensure `{}` is not valid for images", ensure_name(other)),
            ));
        }
    };

    Ok(ImageSpec {
        name,
        source,
        ensure,
    })
}

fn build_run(d: &RunDecl) -> Result<RunSpec> {
    let owner = ResourceKey::new(ResourceKind::Run, &d.id).to_string();
    let name = ContainerName::new(&d.id).map_err(|e| rename(e, &owner))?;

    let ensure = match (d.ensure, d.running) {
        (None | Some(Ensure::Present), running) => RunEnsure::Present {
            running: running.unwrap_or(true),
        },
        (Some(Ensure::Running), None | Some(true)) => RunEnsure::Present { running: true },
        (Some(Ensure::Stopped), None | Some(false)) => RunEnsure::Present { running: false },
        (Some(Ensure::Absent), _) => RunEnsure::Absent,
        (Some(Ensure::Running), Some(false)) | (Some(Ensure::Stopped), Some(true)) => {
            return Err(DockhandError::validation(
                owner,
                "ensure and running disagree; drop one of them",
            ));
        }
        (Some(Ensure::Latest), _) => {
            return Err(DockhandError::validation(
                owner,
                "ensure `latest` is not valid for containers",
            ));
        }
    };

    let image = d.image.clone().filter(|i| !i.trim().is_empty());
    if image.is_none() && ensure != RunEnsure::Absent {
        return Err(DockhandError::validation(owner, "image is required"));
    }

    for (field, values) in [
        ("ports", &d.ports),
        ("expose", &d.expose),
        ("volumes", &d.volumes),
        ("cpuset", &d.cpuset),
        ("links", &d.links),
        ("env", &d.env),
    ] {
        if values.0.iter().any(|v| v.trim().is_empty()) {
            return Err(DockhandError::validation(
                owner,
                format!("{field} must not contain empty entries"),
            ));
        }
    }

    let command = match &d.command {
        None => Vec::new(),
        Some(CommandLine::Line(line)) => line.split_whitespace().map(ToString::to_string).collect(),
        Some(CommandLine::Argv(argv)) => argv.clone(),
    };

    Ok(RunSpec {
        name,
        image,
        command,
        ports: d.ports.0.clone(),
        expose: d.expose.0.clone(),
        volumes: d.volumes.0.clone(),
        hostname: d.hostname.clone(),
        cpuset: d.cpuset.0.clone(),
        links: d.links.0.clone(),
        env: d.env.0.clone(),
        restart: d.restart.clone(),
        ensure,
    })
}

fn build_exec(d: &ExecDecl) -> Result<ExecSpec> {
    let owner = ResourceKey::new(ResourceKind::Exec, &d.id).to_string();
    match d.ensure {
        None | Some(Ensure::Present) => {}
        Some(other) => {
            return Err(DockhandError::validation(
                owner,
                format!("ensure `{}` is not valid for exec", ensure_name(other)),
            ));
        }
    }
    let Some(container) = d.container.as_deref() else {
        return Err(DockhandError::validation(owner, "container is required"));
    };
    let container = ContainerName::new(container).map_err(|e| rename(e, &owner))?;

    let Some(command) = d.command.as_ref().and_then(exec_command) else {
        return Err(DockhandError::validation(owner, "command is required"));
    };
    let unless = match &d.unless {
        None => None,
        Some(guard) => Some(
            exec_command(guard)
                .ok_or_else(|| DockhandError::validation(&owner, "unless must not be empty"))?,
        ),
    };

    Ok(ExecSpec {
        container,
        command,
        tty: d.tty,
        interactive: d.interactive,
        detach: d.detach,
        refreshonly: d.refreshonly,
        unless,
    })
}

fn exec_command(line: &CommandLine) -> Option<ExecCommand> {
    match line {
        CommandLine::Line(s) if !s.trim().is_empty() => Some(ExecCommand::Shell(s.clone())),
        CommandLine::Argv(argv) if !argv.is_empty() => Some(ExecCommand::Argv(argv.clone())),
        _ => None,
    }
}

const fn ensure_name(ensure: Ensure) -> &'static str {
    match ensure {
        Ensure::Present => "present",
        Ensure::Absent => "absent",
        Ensure::Running => "running",
        Ensure::Stopped => "stopped",
        Ensure::Latest => "latest",
    }
}

fn rename(err: DockhandError, owner: &str) -> DockhandError {
    match err {
        DockhandError::Validation { message, .. } => DockhandError::validation(owner, message),
        other => other,
    }
}

fn check_duplicate_keys(resources: &[Resource]) -> Result<()> {
    let mut seen = HashSet::new();
    for r in resources {
        if !seen.insert(&r.key) {
            return Err(DockhandError::validation(
                r.key.to_string(),
                "declared more than once",
            ));
        }
    }
    Ok(())
}

fn check_container_collisions(resources: &[Resource]) -> Result<()> {
    let mut seen: Vec<(&str, &ResourceKey)> = Vec::new();
    for r in resources {
        if let ResourceSpec::Run(run) = &r.spec {
            if let Some((_, first)) = seen.iter().find(|(n, _)| *n == run.name.as_str()) {
                return Err(DockhandError::validation(
                    r.key.to_string(),
                    format!("container name \"{}\" collides with {first}", run.name),
                ));
            }
            seen.push((run.name.as_str(), &r.key));
        }
    }
    Ok(())
}

fn resolve_all(keys: &[ResourceKey], owner: &ResourceKey, raw: &[String]) -> Result<Vec<ResourceKey>> {
    let mut out = Vec::with_capacity(raw.len());
    for r in raw {
        push_unique(&mut out, resolve(keys, owner, r)?);
    }
    Ok(out)
}

fn resolve(keys: &[ResourceKey], owner: &ResourceKey, raw: &str) -> Result<ResourceKey> {
    let owner_name = owner.to_string();
    let target = match raw.parse::<ResourceRef>().map_err(|e| rename(e, &owner_name))? {
        ResourceRef::Qualified(key) => {
            if !keys.contains(&key) {
                return Err(DockhandError::validation(
                    owner_name,
                    format!("relation target {key} is not declared"),
                ));
            }
            key
        }
        ResourceRef::Bare(id) => {
            let matches: Vec<&ResourceKey> = keys.iter().filter(|k| k.id == id).collect();
            match matches.as_slice() {
                [only] => (*only).clone(),
                [] => {
                    return Err(DockhandError::validation(
                        owner_name,
                        format!("relation target \"{id}\" is not declared"),
                    ));
                }
                many => {
                    let names: Vec<String> = many.iter().map(ToString::to_string).collect();
                    return Err(DockhandError::validation(
                        owner_name,
                        format!(
                            "relation target \"{id}\" is ambiguous ({}); use Kind[id]",
                            names.join(", ")
                        ),
                    ));
                }
            }
        }
    };
    if target == *owner {
        return Err(DockhandError::validation(
            owner_name,
            "a resource cannot relate to itself",
        ));
    }
    Ok(target)
}

fn push_unique(list: &mut Vec<ResourceKey>, key: ResourceKey) {
    if !list.contains(&key) {
        list.push(key);
    }
}

/// Adds the relations a reader would expect without spelling them out:
/// a container after the image it uses and after the containers it names
/// in `depends`/`links`, and an exec after the container it targets.
///
/// An implied edge is skipped when an explicit relation already orders the
/// pair the other way.
fn add_implied_dependencies(file: &ManifestFile, resources: &mut [Resource]) {
    let mut implied: Vec<(usize, ResourceKey)> = Vec::new();
    for (i, r) in resources.iter().enumerate() {
        match (&r.spec, &file.resources[i]) {
            (ResourceSpec::Run(run), Declaration::Run(decl)) => {
                if let Some(image) = &run.image {
                    for (t, target) in resources.iter().enumerate() {
                        if !image_matches(target, image) {
                            continue;
                        }
                        // Removing both: the container has to go first.
                        if run.ensure == RunEnsure::Absent && image_removed(target) {
                            implied.push((t, r.key.clone()));
                        } else {
                            implied.push((i, target.key.clone()));
                        }
                    }
                }
                let linked = run
                    .links
                    .iter()
                    .map(|l| l.split(':').next().unwrap_or(l).trim_start_matches('/'));
                for name in decl.depends.0.iter().map(String::as_str).chain(linked) {
                    match container_owner(resources, name) {
                        Some(target) => implied.push((i, target.clone())),
                        None => tracing::debug!(resource = %r.key, container = name, "depends on undeclared container"),
                    }
                }
            }
            (ResourceSpec::Exec(exec), _) => {
                if let Some(target) = container_owner(resources, exec.container.as_str()) {
                    implied.push((i, target.clone()));
                }
            }
            _ => {}
        }
    }

    for (i, target) in implied {
        let own = resources[i].key.clone();
        if target == own {
            continue;
        }
        let reversed = resources[i].notifies.contains(&target)
            || resources
                .iter()
                .find(|r| r.key == target)
                .is_some_and(|t| t.depends_on.contains(&own));
        if !reversed {
            push_unique(&mut resources[i].depends_on, target);
        }
    }
}

fn image_matches(candidate: &Resource, image: &str) -> bool {
    match &candidate.spec {
        ResourceSpec::Image(spec) => spec.name == image || spec.reference() == image,
        _ => false,
    }
}

fn image_removed(candidate: &Resource) -> bool {
    matches!(&candidate.spec, ResourceSpec::Image(spec) if spec.ensure == ImageEnsure::Absent)
}

fn container_owner<'a>(resources: &'a [Resource], name: &str) -> Option<&'a ResourceKey> {
    resources.iter().find_map(|r| match &r.spec {
        ResourceSpec::Run(run) if run.name.as_str() == name => Some(&r.key),
        _ => None,
    })
}
