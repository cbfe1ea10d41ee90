//! In-memory container runtime for tests.
//!
//! `FakeDocker` implements [`CommandExecutor`] by interpreting the same
//! argument lists [`DockerCli`](crate::docker::DockerCli) produces, so the
//! whole command layer runs unchanged against it. It records every call,
//! can inject failures, and measures how many calls overlapped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dockhand_common::error::Result;
use serde_json::json;

use crate::executor::{CommandExecutor, CommandOutput};

/// A container held by the fake runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    /// Container id.
    pub id: String,
    /// Image reference it was created from.
    pub image: String,
    /// Whether it is running.
    pub running: bool,
    /// Labels set at creation.
    pub labels: BTreeMap<String, String>,
    /// Command given at creation.
    pub command: Vec<String>,
    /// Paths created by `touch` inside the container.
    pub files: BTreeSet<String>,
}

#[derive(Debug)]
struct Injected {
    prefix: Vec<String>,
    output: CommandOutput,
    remaining: usize,
}

#[derive(Debug, Default)]
struct State {
    images: BTreeMap<String, String>,
    registry: BTreeMap<String, String>,
    archives: BTreeMap<String, String>,
    containers: BTreeMap<String, FakeContainer>,
    invocations: Vec<Vec<String>>,
    injected: Vec<Injected>,
    busy: BTreeSet<String>,
    next_id: u64,
}

/// In-memory runtime that understands the `docker` argument lists.
#[derive(Debug, Default)]
pub struct FakeDocker {
    state: Mutex<State>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    overlaps: AtomicUsize,
}

impl FakeDocker {
    /// An empty runtime: no images, no containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a local image.
    #[must_use]
    pub fn with_image(self, reference: &str, id: &str) -> Self {
        let _ = self.lock().images.insert(reference.into(), id.into());
        self
    }

    /// Adds an unlabeled container, as if created outside dockhand.
    #[must_use]
    pub fn with_container(self, name: &str, image: &str, running: bool) -> Self {
        {
            let mut state = self.lock();
            let id = state.fresh_id("container");
            let _ = state.containers.insert(
                name.into(),
                FakeContainer {
                    id,
                    image: image.into(),
                    running,
                    labels: BTreeMap::new(),
                    command: Vec::new(),
                    files: BTreeSet::new(),
                },
            );
        }
        self
    }

    /// Adds a saved image archive that restores `reference` when loaded.
    #[must_use]
    pub fn with_archive(self, path: &str, reference: &str) -> Self {
        let _ = self.lock().archives.insert(path.into(), reference.into());
        self
    }

    /// Makes every call sleep for `delay` while it is in flight.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the id the registry serves for `reference` on the next pull.
    pub fn publish(&self, reference: &str, id: &str) {
        let _ = self.lock().registry.insert(reference.into(), id.into());
    }

    /// Makes the next `times` calls whose arguments start with `prefix`
    /// return `output` without touching any state.
    pub fn fail_next(&self, prefix: &[&str], output: CommandOutput, times: usize) {
        self.lock().injected.push(Injected {
            prefix: prefix.iter().map(ToString::to_string).collect(),
            output,
            remaining: times,
        });
    }

    /// Every call so far, as argument lists.
    #[must_use]
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.lock().invocations.clone()
    }

    /// Every call except inspects, rendered as one space-joined line.
    #[must_use]
    pub fn mutations(&self) -> Vec<String> {
        self.lock()
            .invocations
            .iter()
            .filter(|args| !matches!(args.first().map(String::as_str), Some("image" | "container")))
            .map(|args| args.join(" "))
            .collect()
    }

    /// Snapshot of a container.
    #[must_use]
    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock().containers.get(name).cloned()
    }

    /// Id of a local image.
    #[must_use]
    pub fn image_id(&self, reference: &str) -> Option<String> {
        self.lock().images.get(reference).cloned()
    }

    /// Highest number of calls that were in flight at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// How often a call started while another call on the same object was
    /// still in flight.
    #[must_use]
    pub fn object_overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, object: Option<&str>) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(object) = object {
            if !self.lock().busy.insert(object.to_string()) {
                let _ = self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn leave(&self, object: Option<&str>) {
        if let Some(object) = object {
            let _ = self.lock().busy.remove(object);
        }
        let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CommandExecutor for FakeDocker {
    fn execute(&self, _program: &str, args: &[String]) -> Result<CommandOutput> {
        let object = object_of(args);
        self.enter(object.as_deref());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let output = {
            let mut state = self.lock();
            state.invocations.push(args.to_vec());
            state.injected_output(args).unwrap_or_else(|| state.interpret(args))
        };
        self.leave(object.as_deref());
        Ok(output)
    }
}

impl State {
    fn fresh_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}{:060}", self.next_id)
    }

    fn injected_output(&mut self, args: &[String]) -> Option<CommandOutput> {
        let hit = self
            .injected
            .iter_mut()
            .find(|i| i.remaining > 0 && args.starts_with(&i.prefix))?;
        hit.remaining -= 1;
        Some(hit.output.clone())
    }

    fn interpret(&mut self, args: &[String]) -> CommandOutput {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["image", "inspect", "--format", _, reference] => self.images.get(*reference).map_or_else(
                || CommandOutput::failed(1, format!("Error: No such image: {reference}")),
                |id| CommandOutput::ok(format!("{id}\n")),
            ),
            ["pull", reference] => {
                let id = match self.registry.get(*reference).cloned() {
                    Some(id) => id,
                    None => self.fresh_id("sha256:"),
                };
                let _ = self.images.insert((*reference).to_string(), id);
                CommandOutput::ok(format!("Status: Downloaded newer image for {reference}\n"))
            }
            ["build", "-t", reference, ..] => {
                let id = self.fresh_id("sha256:");
                let _ = self.images.insert((*reference).to_string(), id);
                CommandOutput::ok("Successfully built\n")
            }
            ["load", "-i", archive] => {
                let Some(reference) = self.archives.get(*archive).cloned() else {
                    return CommandOutput::failed(1, format!("open {archive}: no such file or directory"));
                };
                let id = self.fresh_id("sha256:");
                let _ = self.images.insert(reference.clone(), id);
                CommandOutput::ok(format!("Loaded image: {reference}\n"))
            }
            ["rmi", reference] => {
                if self.containers.values().any(|c| c.image == *reference) {
                    return CommandOutput::failed(
                        1,
                        format!("Error response from daemon: conflict: unable to remove repository reference \"{reference}\""),
                    );
                }
                match self.images.remove(*reference) {
                    Some(_) => CommandOutput::ok(format!("Untagged: {reference}\n")),
                    None => CommandOutput::failed(1, format!("Error: No such image: {reference}")),
                }
            }
            ["container", "inspect", name] => self.inspect(name),
            ["create", rest @ ..] => self.create(rest),
            ["start", name] => self.with_existing(name, |c| {
                c.running = true;
                CommandOutput::ok(format!("{name}\n"))
            }),
            ["stop", name] => self.with_existing(name, |c| {
                c.running = false;
                CommandOutput::ok(format!("{name}\n"))
            }),
            ["rm", name] => match self.containers.get(*name).map(|c| (c.running, c.id.clone())) {
                None => CommandOutput::failed(1, format!("Error: No such container: {name}")),
                Some((true, id)) => CommandOutput::failed(
                    1,
                    format!("Error response from daemon: You cannot remove a running container {id}"),
                ),
                Some((false, _)) => {
                    let _ = self.containers.remove(*name);
                    CommandOutput::ok(format!("{name}\n"))
                }
            },
            ["exec", rest @ ..] => self.exec(rest),
            _ => CommandOutput::failed(1, format!("unknown command: {}", args.join(" "))),
        }
    }

    fn with_existing(
        &mut self,
        name: &str,
        apply: impl FnOnce(&mut FakeContainer) -> CommandOutput,
    ) -> CommandOutput {
        match self.containers.get_mut(name) {
            Some(container) => apply(container),
            None => CommandOutput::failed(1, format!("Error: No such container: {name}")),
        }
    }

    fn inspect(&self, name: &str) -> CommandOutput {
        let Some(c) = self.containers.get(name) else {
            return CommandOutput::failed(1, format!("Error: No such container: {name}"));
        };
        let labels = if c.labels.is_empty() {
            serde_json::Value::Null
        } else {
            json!(c.labels)
        };
        let doc = json!([{
            "Id": c.id,
            "Name": format!("/{name}"),
            "State": { "Status": if c.running { "running" } else { "exited" }, "Running": c.running },
            "Config": { "Image": c.image, "Cmd": c.command, "Labels": labels },
        }]);
        CommandOutput::ok(doc.to_string())
    }

    fn create(&mut self, rest: &[&str]) -> CommandOutput {
        let mut name = None;
        let mut labels = BTreeMap::new();
        let mut positional = Vec::new();
        let mut iter = rest.iter();
        while let Some(arg) = iter.next() {
            match *arg {
                "--name" => name = iter.next().copied(),
                "--label" => {
                    if let Some((k, v)) = iter.next().and_then(|l| l.split_once('=')) {
                        let _ = labels.insert(k.to_string(), v.to_string());
                    }
                }
                "-p" | "--expose" | "-v" | "--hostname" | "--cpuset-cpus" | "--link" | "-e"
                | "--restart" if positional.is_empty() => {
                    let _ = iter.next();
                }
                other => positional.push(other.to_string()),
            }
        }
        let Some(name) = name else {
            return CommandOutput::failed(125, "fake: create without --name");
        };
        if self.containers.contains_key(name) {
            return CommandOutput::failed(
                125,
                format!("Error response from daemon: Conflict. The container name \"/{name}\" is already in use"),
            );
        }
        let Some((image, command)) = positional.split_first() else {
            return CommandOutput::failed(125, "\"docker create\" requires at least 1 argument.");
        };
        if !self.images.contains_key(image) {
            let id = self.fresh_id("sha256:");
            let _ = self.images.insert(image.clone(), id);
        }
        let id = self.fresh_id("container");
        let _ = self.containers.insert(
            name.to_string(),
            FakeContainer {
                id: id.clone(),
                image: image.clone(),
                running: false,
                labels,
                command: command.to_vec(),
                files: BTreeSet::new(),
            },
        );
        CommandOutput::ok(format!("{id}\n"))
    }

    fn exec(&mut self, rest: &[&str]) -> CommandOutput {
        let mut iter = rest.iter().skip_while(|a| matches!(**a, "-t" | "-i" | "-d"));
        let Some(name) = iter.next() else {
            return CommandOutput::failed(1, "\"docker exec\" requires at least 2 arguments.");
        };
        let argv: Vec<&str> = iter.copied().collect();
        let Some(container) = self.containers.get_mut(*name) else {
            return CommandOutput::failed(1, format!("Error: No such container: {name}"));
        };
        if !container.running {
            return CommandOutput::failed(
                1,
                format!("Error response from daemon: Container {} is not running", container.id),
            );
        }
        let words: Vec<&str> = match argv.as_slice() {
            ["/bin/sh" | "sh", "-c", line] | ["cmd", "/c", line] => line.split_whitespace().collect(),
            other => other.to_vec(),
        };
        match words.as_slice() {
            ["touch", paths @ ..] => {
                container.files.extend(paths.iter().map(ToString::to_string));
                CommandOutput::ok("")
            }
            ["test", "-f" | "-e", path] | ["ls", path] => {
                if container.files.contains(*path) {
                    CommandOutput::ok(format!("{path}\n"))
                } else {
                    CommandOutput::failed(1, format!("{path}: No such file or directory"))
                }
            }
            ["false"] | ["exit", "1"] => CommandOutput::failed(1, ""),
            _ => CommandOutput::ok(""),
        }
    }
}

/// Named object a call touches, for overlap accounting.
fn object_of(args: &[String]) -> Option<String> {
    let words: Vec<&str> = args.iter().map(String::as_str).collect();
    let object = match words.as_slice() {
        ["image", "inspect", .., reference] | ["pull", reference] | ["rmi", reference] => {
            format!("image:{reference}")
        }
        ["build", "-t", reference, ..] => format!("image:{reference}"),
        ["container", "inspect", name] | ["start", name] | ["stop", name] | ["rm", name] => {
            format!("container:{name}")
        }
        ["create", "--name", name, ..] => format!("container:{name}"),
        ["exec", rest @ ..] => {
            let name = rest.iter().find(|a| !matches!(**a, "-t" | "-i" | "-d"))?;
            format!("container:{name}")
        }
        _ => return None,
    };
    Some(object)
}
