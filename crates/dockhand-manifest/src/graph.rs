//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph from a catalog's relations and resolves a
//! deterministic topological ordering for convergence.

use std::collections::{BTreeSet, HashMap, VecDeque};

use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::ResourceKey;
use petgraph::Direction;
use petgraph::graph::NodeIndex;

use crate::model::Catalog;

/// Why one resource is ordered before another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The dependent requires the dependency (explicit or implied).
    Requires,
    /// The source notifies the target, which implies ordering.
    Notifies,
}

/// A dependency graph of resources.
///
/// Node indices match catalog positions, so callers can move freely between
/// the two.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Internal petgraph representation; edges point from a dependency to
    /// its dependent.
    graph: petgraph::Graph<ResourceKey, Relation>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: petgraph::Graph::new(),
        }
    }

    /// Builds the graph for a validated catalog.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut graph = Self::new();
        let mut index: HashMap<&ResourceKey, NodeIndex> = HashMap::new();
        for resource in &catalog.resources {
            let node = graph.add_resource(resource.key.clone());
            let _ = index.insert(&resource.key, node);
        }
        for resource in &catalog.resources {
            let me = index[&resource.key];
            for dep in &resource.depends_on {
                if let Some(&dep) = index.get(dep) {
                    graph.add_edge(dep, me, Relation::Requires);
                }
            }
            for target in &resource.notifies {
                if let Some(&target) = index.get(target) {
                    graph.add_edge(me, target, Relation::Notifies);
                }
            }
        }
        tracing::debug!(
            nodes = graph.len(),
            edges = graph.graph.edge_count(),
            "dependency graph built"
        );
        graph
    }

    /// Adds a resource node to the graph.
    pub fn add_resource(&mut self, key: ResourceKey) -> NodeIndex {
        self.graph.add_node(key)
    }

    /// Adds an edge: `after` converges after `before`.
    pub fn add_edge(&mut self, before: NodeIndex, after: NodeIndex, relation: Relation) {
        if self.graph.find_edge(before, after).is_none() {
            let _ = self.graph.add_edge(before, after, relation);
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Resources that must converge before `position`, in ascending order.
    #[must_use]
    pub fn dependencies(&self, position: usize) -> Vec<usize> {
        self.sorted_neighbors(position, Direction::Incoming)
    }

    /// Resources that converge after `position`, in ascending order.
    #[must_use]
    pub fn dependents(&self, position: usize) -> Vec<usize> {
        self.sorted_neighbors(position, Direction::Outgoing)
    }

    fn sorted_neighbors(&self, position: usize, direction: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(position), direction)
            .map(NodeIndex::index)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Returns a topological ordering of node positions.
    ///
    /// Dependencies come before their dependents. Among resources that are
    /// ready at the same time, the one declared first wins, so the order is
    /// stable across runs.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::Cycle`] naming one cycle if the graph is
    /// not acyclic.
    pub fn resolve_order(&self) -> Result<Vec<usize>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.dependencies(n.index()).len())
            .collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| (d == 0).then_some(i))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for dependent in self.dependents(next) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    let _ = ready.insert(dependent);
                }
            }
        }

        if order.len() == self.len() {
            Ok(order)
        } else {
            Err(DockhandError::Cycle {
                resources: self.find_cycle(),
            })
        }
    }

    /// Names one cycle, starting and ending at its earliest-declared member.
    fn find_cycle(&self) -> Vec<String> {
        let Some(component) = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .min_by_key(|scc| scc.iter().map(|n| n.index()).min())
        else {
            return Vec::new();
        };
        let members: BTreeSet<usize> = component.iter().map(|n| n.index()).collect();
        let Some(&start) = members.first() else {
            return Vec::new();
        };

        // Shortest walk back to `start` inside the component.
        let mut parent: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut closing = None;
        while let Some(node) = queue.pop_front() {
            for next in self.dependents(node) {
                if next == start {
                    closing = Some(node);
                    break;
                }
                if members.contains(&next) && !parent.contains_key(&next) {
                    let _ = parent.insert(next, node);
                    queue.push_back(next);
                }
            }
            if closing.is_some() {
                break;
            }
        }

        let mut path = vec![start];
        let mut cursor = closing.unwrap_or(start);
        let mut tail = Vec::new();
        while cursor != start {
            tail.push(cursor);
            cursor = parent.get(&cursor).copied().unwrap_or(start);
        }
        path.extend(tail.into_iter().rev());
        path.push(start);
        path.into_iter()
            .map(|i| self.graph[NodeIndex::new(i)].to_string())
            .collect()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
