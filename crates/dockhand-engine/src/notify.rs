//! Change tracking and the refresh-only gate.
//!
//! A resource lands in the [`ChangeSet`] when its outcome in the current run
//! is `changed`. A refresh-only exec runs only when one of the resources
//! notifying it is in the set; otherwise it is skipped without querying the
//! runtime.

use std::collections::HashSet;

use dockhand_manifest::model::{Catalog, ResourceSpec};

/// Positions of resources whose outcome was `changed` in this run.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changed: HashSet<usize>,
}

impl ChangeSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a resource as changed.
    pub fn record(&mut self, position: usize) {
        let _ = self.changed.insert(position);
    }

    /// Whether a resource changed.
    #[must_use]
    pub fn contains(&self, position: usize) -> bool {
        self.changed.contains(&position)
    }
}

/// For each catalog position, the positions of resources that notify it.
#[must_use]
pub fn subscriptions(catalog: &Catalog) -> Vec<Vec<usize>> {
    let mut subs = vec![Vec::new(); catalog.len()];
    for (source, resource) in catalog.resources.iter().enumerate() {
        for target in &resource.notifies {
            if let Some(t) = catalog.position(target) {
                subs[t].push(source);
            }
        }
    }
    subs
}

/// Whether the resource at `position` is refresh-only and none of its
/// notifiers changed, so it must be skipped.
#[must_use]
pub fn suppressed(
    catalog: &Catalog,
    subscriptions: &[Vec<usize>],
    changes: &ChangeSet,
    position: usize,
) -> bool {
    let refreshonly = matches!(
        &catalog.resources[position].spec,
        ResourceSpec::Exec(exec) if exec.refreshonly
    );
    refreshonly
        && !subscriptions[position]
            .iter()
            .any(|&source| changes.contains(source))
}
