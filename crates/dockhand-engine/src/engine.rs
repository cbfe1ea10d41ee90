//! Dependency-aware, bounded, concurrent convergence.
//!
//! The scheduler is a single async loop that owns all per-run state (the
//! pending-dependency counters, the ready queue, the change set). Resources
//! whose dependencies have all finished are dispatched onto a [`JoinSet`],
//! never more than `workers` at a time. Each dispatched resource takes the
//! mutex of the runtime object it touches, then observes, diffs and applies
//! on a blocking thread.
//!
//! Dispatch stops once the [`CancelToken`] fires; everything not yet
//! dispatched is reported as cancelled while in-flight work finishes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dockhand_common::constants::DEFAULT_WORKERS;
use dockhand_common::error::{DockhandError, Result};
use dockhand_manifest::graph::DependencyGraph;
use dockhand_manifest::model::{Catalog, Resource, ResourceSpec};
use dockhand_runtime::docker::{Context, DockerCli};
use dockhand_runtime::observed::{ImageState, observe};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::diff::diff;
use crate::notify::{ChangeSet, subscriptions, suppressed};
use crate::outcome::{Failure, Outcome, ResourceReport, RunReport};
use crate::plan::Action;

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum resources converging at once; `1` is fully sequential.
    pub workers: usize,
    /// Only diff; report the actions that would run.
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            dry_run: false,
        }
    }
}

/// Converges catalogs against one runtime.
#[derive(Debug, Clone)]
pub struct Engine {
    docker: DockerCli,
    options: EngineOptions,
}

type Finished = (usize, Outcome, Duration);

impl Engine {
    /// Creates an engine.
    #[must_use]
    pub const fn new(docker: DockerCli, options: EngineOptions) -> Self {
        Self { docker, options }
    }

    /// Converges every resource in `catalog` and reports what happened.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::Cycle`] before any runtime command is issued
    /// if the relations are cyclic. Per-resource failures are reported in
    /// the [`RunReport`], not as an error.
    pub async fn run(&self, catalog: Arc<Catalog>, cancel: &CancelToken) -> Result<RunReport> {
        let graph = DependencyGraph::from_catalog(&catalog);
        let order = graph.resolve_order()?;

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("converge", %run_id, dry_run = self.options.dry_run);
        let started_at = Utc::now();
        let mut outcomes = self
            .schedule(&catalog, &graph, &order, cancel)
            .instrument(span)
            .await;

        let mut resources = Vec::with_capacity(order.len());
        for &i in &order {
            let (outcome, elapsed) = outcomes[i].take().unwrap_or_else(|| {
                (
                    Outcome::failed(Failure::Error {
                        message: "worker task was lost".into(),
                    }),
                    Duration::ZERO,
                )
            });
            resources.push(ResourceReport {
                resource: catalog.resources[i].key.clone(),
                outcome,
                duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.options.dry_run,
            resources,
        };
        tracing::info!(
            %run_id,
            changed = report.changed(),
            failed = report.failed(),
            "run finished"
        );
        Ok(report)
    }

    async fn schedule(
        &self,
        catalog: &Arc<Catalog>,
        graph: &DependencyGraph,
        order: &[usize],
        cancel: &CancelToken,
    ) -> Vec<Option<(Outcome, Duration)>> {
        let workers = self.options.workers.max(1);
        let locks = object_locks(catalog);
        let mut state = RunState::new(catalog, graph, order);
        let mut tasks: JoinSet<Finished> = JoinSet::new();

        loop {
            while tasks.len() < workers {
                let Some(index) = state.next_ready() else {
                    break;
                };
                match state.immediate_outcome(index, cancel) {
                    Some(outcome) => state.settle(index, outcome, Duration::ZERO),
                    None => self.dispatch(&mut tasks, catalog, index, &locks),
                }
            }

            match tasks.join_next().await {
                Some(Ok((index, outcome, elapsed))) => state.settle(index, outcome, elapsed),
                Some(Err(err)) => tracing::error!(error = %err, "worker task aborted"),
                None => break,
            }
        }
        state.outcomes
    }

    fn dispatch(
        &self,
        tasks: &mut JoinSet<Finished>,
        catalog: &Arc<Catalog>,
        index: usize,
        locks: &HashMap<String, Arc<Mutex<()>>>,
    ) {
        let resource = &catalog.resources[index];
        let lock = locks
            .get(&resource.lock_key())
            .map_or_else(|| Arc::new(Mutex::new(())), Arc::clone);
        let span = tracing::info_span!("resource", resource = %resource.key);
        let docker = self.docker.clone();
        let catalog = Arc::clone(catalog);
        let dry_run = self.options.dry_run;

        let _ = tasks.spawn(async move {
            let _guard = lock.lock_owned().await;
            let started = Instant::now();
            let outcome = tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                converge_resource(&docker, &catalog.resources[index], dry_run)
            })
            .await
            .unwrap_or_else(|err| {
                Outcome::failed(Failure::Error {
                    message: format!("worker panicked: {err}"),
                })
            });
            (index, outcome, started.elapsed())
        });
    }
}

/// Per-run bookkeeping owned by the scheduler loop.
struct RunState<'a> {
    catalog: &'a Catalog,
    graph: &'a DependencyGraph,
    order: &'a [usize],
    /// Topological rank of each catalog position.
    rank: Vec<usize>,
    /// Unfinished dependencies per position.
    pending: Vec<usize>,
    /// Ranks of resources whose dependencies have all finished.
    ready: BTreeSet<usize>,
    subscriptions: Vec<Vec<usize>>,
    changes: ChangeSet,
    failed: Vec<bool>,
    outcomes: Vec<Option<(Outcome, Duration)>>,
}

impl<'a> RunState<'a> {
    fn new(catalog: &'a Catalog, graph: &'a DependencyGraph, order: &'a [usize]) -> Self {
        let total = catalog.len();
        let mut rank = vec![0; total];
        for (r, &i) in order.iter().enumerate() {
            rank[i] = r;
        }
        let pending: Vec<usize> = (0..total).map(|i| graph.dependencies(i).len()).collect();
        let ready = (0..total)
            .filter(|&i| pending[i] == 0)
            .map(|i| rank[i])
            .collect();
        Self {
            catalog,
            graph,
            order,
            rank,
            pending,
            ready,
            subscriptions: subscriptions(catalog),
            changes: ChangeSet::new(),
            failed: vec![false; total],
            outcomes: vec![None; total],
        }
    }

    fn next_ready(&mut self) -> Option<usize> {
        self.ready.pop_first().map(|r| self.order[r])
    }

    /// Outcome decided without touching the runtime: cancelled, blocked by
    /// a failed dependency, or a refresh-only resource nobody notified.
    fn immediate_outcome(&self, index: usize, cancel: &CancelToken) -> Option<Outcome> {
        let resource = &self.catalog.resources[index];
        if let Some(reason) = cancel.reason() {
            tracing::warn!(resource = %resource.key, reason, "not dispatched");
            let err = DockhandError::Timeout {
                resource: resource.key.to_string(),
                reason: reason.to_string(),
            };
            return Some(Outcome::failed(Failure::from(err)));
        }
        if let Some(dep) = self
            .graph
            .dependencies(index)
            .into_iter()
            .find(|&d| self.failed[d])
        {
            let dependency = self.catalog.resources[dep].key.to_string();
            tracing::warn!(resource = %resource.key, %dependency, "skipped, dependency failed");
            return Some(Outcome::failed(Failure::DependencyFailed { dependency }));
        }
        if suppressed(self.catalog, &self.subscriptions, &self.changes, index) {
            tracing::debug!(resource = %resource.key, "refresh-only and not notified");
            return Some(Outcome::Unchanged);
        }
        None
    }

    fn settle(&mut self, index: usize, outcome: Outcome, elapsed: Duration) {
        if outcome.is_changed() {
            self.changes.record(index);
        }
        self.failed[index] = outcome.is_failed();
        tracing::debug!(resource = %self.catalog.resources[index].key, ?outcome, "settled");
        self.outcomes[index] = Some((outcome, elapsed));
        for dependent in self.graph.dependents(index) {
            self.pending[dependent] -= 1;
            if self.pending[dependent] == 0 {
                let _ = self.ready.insert(self.rank[dependent]);
            }
        }
    }
}

/// One mutex per runtime object named in the catalog.
fn object_locks(catalog: &Catalog) -> HashMap<String, Arc<Mutex<()>>> {
    let mut locks = HashMap::new();
    for resource in &catalog.resources {
        let _ = locks
            .entry(resource.lock_key())
            .or_insert_with(|| Arc::new(Mutex::new(())));
    }
    locks
}

/// Observes, diffs, and (unless `dry_run`) applies one resource.
///
/// Blocking; the scheduler calls it on a blocking thread while holding the
/// resource's object lock.
pub fn converge_resource(docker: &DockerCli, resource: &Resource, dry_run: bool) -> Outcome {
    let observed = match observe(docker, resource) {
        Ok(observed) => observed,
        Err(err) => return Outcome::failed(Failure::from(err)),
    };
    let actions = diff(&resource.spec, &observed);
    if actions.is_empty() {
        tracing::debug!("in sync");
        return Outcome::Unchanged;
    }
    if dry_run {
        return Outcome::Changed { actions };
    }

    let mut applied = Vec::with_capacity(actions.len());
    for action in actions {
        match apply(docker, resource, &action) {
            Ok(true) => {
                tracing::info!(%action, "applied");
                applied.push(action);
            }
            Ok(false) => tracing::debug!(%action, "no change"),
            Err(err) => {
                tracing::error!(%action, error = %err, "action failed");
                return Outcome::Failed {
                    failure: Failure::from(err),
                    applied,
                };
            }
        }
    }
    if applied.is_empty() {
        Outcome::Unchanged
    } else {
        Outcome::Changed { actions: applied }
    }
}

/// Applies one action; `Ok(false)` means it ran but changed nothing.
fn apply(docker: &DockerCli, resource: &Resource, action: &Action) -> Result<bool> {
    let label = action.to_string();
    let ctx = Context {
        resource: &resource.key,
        action: &label,
    };
    match (action, &resource.spec) {
        (Action::PullImage { reference }, _) => docker.pull(ctx, reference).map(|()| true),
        (
            Action::BuildImage {
                reference,
                dockerfile,
            },
            _,
        ) => docker.build(ctx, reference, dockerfile).map(|()| true),
        (Action::LoadImage { archive, .. }, _) => docker.load(ctx, archive).map(|()| true),
        (
            Action::RefreshImage {
                reference,
                previous_id,
            },
            _,
        ) => {
            docker.pull(ctx, reference)?;
            let moved = match docker.inspect_image(&resource.key, reference)? {
                ImageState::Present { id } => id != *previous_id,
                ImageState::Absent => true,
            };
            Ok(moved)
        }
        (Action::RemoveImage { reference }, _) => docker.remove_image(ctx, reference).map(|()| true),
        (Action::CreateContainer { .. }, ResourceSpec::Run(spec)) => docker.create(ctx, spec).map(|id| {
            tracing::debug!(container = %spec.name, id = %id, "created");
            true
        }),
        (Action::StartContainer { name }, _) => docker.start(ctx, name).map(|()| true),
        (Action::StopContainer { name }, _) => docker.stop(ctx, name).map(|()| true),
        (Action::RemoveContainer { name }, _) => docker.remove_container(ctx, name).map(|()| true),
        (Action::Exec { .. }, ResourceSpec::Exec(spec)) => docker.exec(ctx, spec).map(|_| true),
        (action, _) => Err(DockhandError::validation(
            resource.key.to_string(),
            format!("`{action}` does not apply to this resource"),
        )),
    }
}
