//! Typed runtime commands on top of a [`CommandExecutor`].
//!
//! Every call goes through the executor with the platform's binary. A
//! non-zero exit becomes [`DockhandError::Execution`] carrying the resource,
//! the attempted action, and the full command line; inspect commands treat
//! "No such ..." failures as absence instead.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use dockhand_common::constants::{CONFIG_HASH_LABEL, RESOURCE_LABEL};
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::{ContainerName, ResourceKey};
use dockhand_manifest::model::{ExecCommand, ExecSpec, RunSpec};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::executor::{CommandExecutor, CommandOutput, command_line};
use crate::observed::{ContainerInfo, ContainerState, ImageState};
use crate::platform::Platform;

/// Resource and action a mutating command is run for; attached to failures.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// Resource being converged.
    pub resource: &'a ResourceKey,
    /// Human-readable action label (`create c1`).
    pub action: &'a str,
}

/// Container runtime driven through its command-line interface.
#[derive(Clone)]
pub struct DockerCli {
    executor: Arc<dyn CommandExecutor>,
    platform: Platform,
}

impl std::fmt::Debug for DockerCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerCli")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedContainer {
    id: String,
    state: InspectedState,
    config: InspectedConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedState {
    running: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedConfig {
    #[serde(default)]
    image: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

impl DockerCli {
    /// Creates a runtime client.
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>, platform: Platform) -> Self {
        Self { executor, platform }
    }

    /// Platform this client targets.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    fn invoke(&self, args: &[String]) -> Result<CommandOutput> {
        tracing::trace!(command = %command_line(self.platform.binary(), args), "runtime call");
        self.executor.execute(self.platform.binary(), args)
    }

    fn checked(&self, ctx: Context<'_>, args: &[String]) -> Result<CommandOutput> {
        let output = self.invoke(args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(self.failure(ctx, args, &output))
        }
    }

    fn failure(&self, ctx: Context<'_>, args: &[String], output: &CommandOutput) -> DockhandError {
        DockhandError::Execution {
            resource: ctx.resource.to_string(),
            action: ctx.action.to_string(),
            command: command_line(self.platform.binary(), args),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
    }

    /// Looks up a local image by reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the inspect fails for a reason other than the
    /// image being absent.
    pub fn inspect_image(&self, resource: &ResourceKey, reference: &str) -> Result<ImageState> {
        let args = argv(&["image", "inspect", "--format", "{{.Id}}", reference]);
        let output = self.invoke(&args)?;
        if output.success() {
            return Ok(ImageState::Present {
                id: output.stdout.trim().to_string(),
            });
        }
        if is_missing(&output) {
            return Ok(ImageState::Absent);
        }
        let action = format!("inspect {reference}");
        Err(self.failure(Context { resource, action: &action }, &args, &output))
    }

    /// Looks up a container by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the inspect fails for a reason other than the
    /// container being absent, or its output cannot be parsed.
    pub fn inspect_container(
        &self,
        resource: &ResourceKey,
        name: &ContainerName,
    ) -> Result<ContainerState> {
        let args = argv(&["container", "inspect", name.as_str()]);
        let output = self.invoke(&args)?;
        if !output.success() {
            if is_missing(&output) {
                return Ok(ContainerState::Absent);
            }
            let action = format!("inspect {name}");
            return Err(self.failure(Context { resource, action: &action }, &args, &output));
        }
        let inspected: Vec<InspectedContainer> = serde_json::from_str(&output.stdout)?;
        Ok(inspected
            .into_iter()
            .next()
            .map_or(ContainerState::Absent, |c| {
                ContainerState::Present(ContainerInfo {
                    id: c.id,
                    running: c.state.running,
                    image: c.config.image,
                    config_hash: c
                        .config
                        .labels
                        .and_then(|mut labels| labels.remove(CONFIG_HASH_LABEL)),
                })
            }))
    }

    /// Pulls an image from its registry.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the pull fails.
    pub fn pull(&self, ctx: Context<'_>, reference: &str) -> Result<()> {
        let _ = self.checked(ctx, &argv(&["pull", reference]))?;
        Ok(())
    }

    /// Builds an image from a Dockerfile, using its directory as context.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the build fails.
    pub fn build(&self, ctx: Context<'_>, reference: &str, dockerfile: &Path) -> Result<()> {
        let context = dockerfile
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| ".".to_string(), |p| p.display().to_string());
        let file = dockerfile.display().to_string();
        let _ = self.checked(ctx, &argv(&["build", "-t", reference, "-f", &file, &context]))?;
        Ok(())
    }

    /// Loads a saved image archive.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the load fails.
    pub fn load(&self, ctx: Context<'_>, archive: &Path) -> Result<()> {
        let archive = archive.display().to_string();
        let _ = self.checked(ctx, &argv(&["load", "-i", &archive]))?;
        Ok(())
    }

    /// Removes a local image.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the removal fails.
    pub fn remove_image(&self, ctx: Context<'_>, reference: &str) -> Result<()> {
        let _ = self.checked(ctx, &argv(&["rmi", reference]))?;
        Ok(())
    }

    /// Creates (but does not start) a container and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the create fails.
    pub fn create(&self, ctx: Context<'_>, spec: &RunSpec) -> Result<String> {
        let args = create_args(ctx.resource, spec)?;
        let output = self.checked(ctx, &args)?;
        Ok(output.stdout.trim().to_string())
    }

    /// Starts a stopped container.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the start fails.
    pub fn start(&self, ctx: Context<'_>, name: &ContainerName) -> Result<()> {
        let _ = self.checked(ctx, &argv(&["start", name.as_str()]))?;
        Ok(())
    }

    /// Stops a running container.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the stop fails.
    pub fn stop(&self, ctx: Context<'_>, name: &ContainerName) -> Result<()> {
        let _ = self.checked(ctx, &argv(&["stop", name.as_str()]))?;
        Ok(())
    }

    /// Removes a stopped container.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the removal fails.
    pub fn remove_container(&self, ctx: Context<'_>, name: &ContainerName) -> Result<()> {
        let _ = self.checked(ctx, &argv(&["rm", name.as_str()]))?;
        Ok(())
    }

    /// Runs an exec resource's command inside its container.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the command exits non-zero.
    pub fn exec(&self, ctx: Context<'_>, spec: &ExecSpec) -> Result<CommandOutput> {
        let mut args = vec!["exec".to_string()];
        for (enabled, flag) in [(spec.tty, "-t"), (spec.interactive, "-i"), (spec.detach, "-d")] {
            if enabled {
                args.push(flag.to_string());
            }
        }
        args.push(spec.container.to_string());
        args.extend(self.command_argv(&spec.command));
        self.checked(ctx, &args)
    }

    /// Runs an `unless` guard and reports whether it exited 0.
    ///
    /// # Errors
    ///
    /// Returns an error only if the runtime binary cannot be spawned.
    pub fn guard(
        &self,
        resource: &ResourceKey,
        container: &ContainerName,
        command: &ExecCommand,
    ) -> Result<bool> {
        let mut args = vec!["exec".to_string(), container.to_string()];
        args.extend(self.command_argv(command));
        let output = self.invoke(&args)?;
        tracing::debug!(%resource, exit_code = output.exit_code, "guard evaluated");
        Ok(output.success())
    }

    fn command_argv(&self, command: &ExecCommand) -> Vec<String> {
        match command {
            ExecCommand::Shell(line) => self.platform.shell_wrap(line),
            ExecCommand::Argv(argv) => argv.clone(),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

fn is_missing(output: &CommandOutput) -> bool {
    output.stderr.to_lowercase().contains("no such")
}

/// Arguments for `create`, including the fingerprint and ownership labels.
///
/// # Errors
///
/// Returns a validation error if `spec` has no image.
pub fn create_args(resource: &ResourceKey, spec: &RunSpec) -> Result<Vec<String>> {
    let Some(image) = spec.image.as_deref() else {
        return Err(DockhandError::validation(resource.to_string(), "image is required"));
    };
    let mut args = argv(&["create", "--name", spec.name.as_str()]);
    args.push("--label".into());
    args.push(format!("{CONFIG_HASH_LABEL}={}", config_fingerprint(spec)));
    args.push("--label".into());
    args.push(format!("{RESOURCE_LABEL}={resource}"));

    let repeated = [
        ("-p", &spec.ports),
        ("--expose", &spec.expose),
        ("-v", &spec.volumes),
        ("--link", &spec.links),
        ("-e", &spec.env),
    ];
    for (flag, values) in repeated {
        for value in values {
            args.push(flag.to_string());
            args.push(value.clone());
        }
    }
    if let Some(hostname) = &spec.hostname {
        args.push("--hostname".into());
        args.push(hostname.clone());
    }
    if !spec.cpuset.is_empty() {
        args.push("--cpuset-cpus".into());
        args.push(spec.cpuset.join(","));
    }
    if let Some(restart) = &spec.restart {
        args.push("--restart".into());
        args.push(restart.clone());
    }
    args.push(image.to_string());
    args.extend(spec.command.iter().cloned());
    Ok(args)
}

/// SHA-256 over the normalized creation parameters of a container.
///
/// Order-insensitive lists are sorted first, so reordering `ports` does not
/// force a recreate. The running flag is not part of the fingerprint.
#[must_use]
pub fn config_fingerprint(spec: &RunSpec) -> String {
    let sorted = |values: &[String]| {
        let mut v = values.to_vec();
        v.sort();
        v
    };
    let single = |value: Option<&str>| value.map(ToString::to_string).into_iter().collect::<Vec<_>>();

    let mut hasher = Sha256::new();
    let fields = [
        ("image", single(spec.image.as_deref())),
        ("command", spec.command.clone()),
        ("ports", sorted(&spec.ports)),
        ("expose", sorted(&spec.expose)),
        ("volumes", sorted(&spec.volumes)),
        ("hostname", single(spec.hostname.as_deref())),
        ("cpuset", sorted(&spec.cpuset)),
        ("links", sorted(&spec.links)),
        ("env", sorted(&spec.env)),
        ("restart", single(spec.restart.as_deref())),
    ];
    for (name, values) in fields {
        hasher.update(name.as_bytes());
        hasher.update([0x1d]);
        for value in values {
            hasher.update(value.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use dockhand_common::types::{OsFamily, ResourceKind};
    use dockhand_manifest::model::RunEnsure;

    use super::*;
    use crate::fake::FakeDocker;

    fn run_spec() -> RunSpec {
        RunSpec {
            name: ContainerName::new("c1").unwrap(),
            image: Some("alpine".into()),
            command: vec!["init".into()],
            ports: vec!["4444".into()],
            expose: vec!["5555".into()],
            volumes: vec!["/var/lib/docker/sample:/tmp/sample".into()],
            hostname: Some("testdocker".into()),
            cpuset: vec!["0".into(), "1".into()],
            links: Vec::new(),
            env: Vec::new(),
            restart: None,
            ensure: RunEnsure::Present { running: true },
        }
    }

    fn key() -> ResourceKey {
        ResourceKey::new(ResourceKind::Run, "c1")
    }

    fn cli(fake: &Arc<FakeDocker>) -> DockerCli {
        DockerCli::new(fake.clone(), Platform::new(OsFamily::Linux))
    }

    #[test]
    fn create_args_carry_every_option() {
        let args = create_args(&key(), &run_spec()).unwrap();
        let line = args.join(" ");
        assert!(line.starts_with("create --name c1 --label dockhand.config-hash="));
        assert!(line.contains("--label dockhand.resource=Run[c1]"));
        assert!(line.contains("-p 4444"));
        assert!(line.contains("--expose 5555"));
        assert!(line.contains("-v /var/lib/docker/sample:/tmp/sample"));
        assert!(line.contains("--hostname testdocker"));
        assert!(line.contains("--cpuset-cpus 0,1"));
        assert!(line.ends_with("alpine init"));
    }

    #[test]
    fn create_args_require_image() {
        let spec = RunSpec {
            image: None,
            ..run_spec()
        };
        assert!(create_args(&key(), &spec).is_err());
    }

    #[test]
    fn fingerprint_ignores_list_order_and_running_flag() {
        let a = run_spec();
        let mut b = run_spec();
        b.cpuset.reverse();
        b.ensure = RunEnsure::Present { running: false };
        assert_eq!(config_fingerprint(&a), config_fingerprint(&b));
        assert_eq!(config_fingerprint(&a).len(), 64);
    }

    #[test]
    fn fingerprint_tracks_configuration() {
        let a = run_spec();
        let mut b = run_spec();
        b.command = vec!["sleep".into(), "60".into()];
        assert_ne!(config_fingerprint(&a), config_fingerprint(&b));
        let mut c = run_spec();
        c.hostname = None;
        assert_ne!(config_fingerprint(&a), config_fingerprint(&c));
    }

    #[test]
    fn inspect_missing_objects_is_absent() {
        let fake = Arc::new(FakeDocker::new());
        let docker = cli(&fake);
        assert_eq!(
            docker.inspect_image(&key(), "alpine").unwrap(),
            ImageState::Absent
        );
        assert_eq!(
            docker
                .inspect_container(&key(), &ContainerName::new("c1").unwrap())
                .unwrap(),
            ContainerState::Absent
        );
    }

    #[test]
    fn create_then_inspect_reports_fingerprint() {
        let fake = Arc::new(FakeDocker::new());
        let docker = cli(&fake);
        let spec = run_spec();
        let id = docker
            .create(Context { resource: &key(), action: "create c1" }, &spec)
            .unwrap();
        let ContainerState::Present(info) = docker.inspect_container(&key(), &spec.name).unwrap()
        else {
            panic!("container should exist");
        };
        assert_eq!(info.id, id);
        assert!(!info.running);
        assert_eq!(info.config_hash, Some(config_fingerprint(&spec)));
    }

    #[test]
    fn failure_carries_resource_action_and_command() {
        let fake = Arc::new(FakeDocker::new());
        let docker = cli(&fake);
        let name = ContainerName::new("ghost").unwrap();
        let err = docker
            .start(Context { resource: &key(), action: "start ghost" }, &name)
            .unwrap_err();
        let DockhandError::Execution {
            resource,
            action,
            command,
            exit_code,
            stderr,
        } = err
        else {
            panic!("expected execution error");
        };
        assert_eq!(resource, "Run[c1]");
        assert_eq!(action, "start ghost");
        assert_eq!(command, "docker start ghost");
        assert_ne!(exit_code, 0);
        assert!(stderr.contains("No such container"));
    }

    #[test]
    fn exec_wraps_shell_strings_and_sets_flags() {
        let fake = Arc::new(FakeDocker::new().with_container("c1", "alpine", true));
        let docker = cli(&fake);
        let spec = ExecSpec {
            container: ContainerName::new("c1").unwrap(),
            command: ExecCommand::Shell("touch /root/a".into()),
            tty: true,
            interactive: false,
            detach: true,
            refreshonly: false,
            unless: None,
        };
        let _ = docker
            .exec(Context { resource: &key(), action: "exec" }, &spec)
            .unwrap();
        let last = fake.invocations().pop().unwrap();
        assert_eq!(last, vec!["exec", "-t", "-d", "c1", "/bin/sh", "-c", "touch /root/a"]);
    }

    #[test]
    fn guard_reflects_exit_status() {
        let fake = Arc::new(FakeDocker::new().with_container("c1", "alpine", true));
        let docker = cli(&fake);
        let name = ContainerName::new("c1").unwrap();
        let check = ExecCommand::Shell("test -f /root/a".into());
        assert!(!docker.guard(&key(), &name, &check).unwrap());
        let touch = ExecCommand::Argv(vec!["touch".into(), "/root/a".into()]);
        assert!(docker.guard(&key(), &name, &touch).unwrap());
        assert!(docker.guard(&key(), &name, &check).unwrap());
    }

    #[test]
    fn build_uses_dockerfile_directory_as_context() {
        let fake = Arc::new(FakeDocker::new());
        let docker = cli(&fake);
        let image_key = ResourceKey::new(ResourceKind::Image, "app");
        docker
            .build(
                Context { resource: &image_key, action: "build app" },
                "app",
                Path::new("/srv/app/Dockerfile"),
            )
            .unwrap();
        assert_eq!(
            fake.invocations().pop().unwrap(),
            vec!["build", "-t", "app", "-f", "/srv/app/Dockerfile", "/srv/app"]
        );
        assert!(matches!(
            docker.inspect_image(&image_key, "app").unwrap(),
            ImageState::Present { .. }
        ));
    }
}
