//! Dependency graph resolution
//!
//! Builds a directed graph over the batch's components (edges point from a
//! dependency to its dependents), detects cycles with explicit paths,
//! computes a deterministic topological install order, and partitions that
//! order into independent groups safe to process concurrently.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::debug;

use crate::app::models::ComponentSpec;
use crate::errors::{GraphError, GraphResult};

/// Directed acyclic dependency graph over component names
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    /// Batch declaration order, used for deterministic tie-breaking
    input_order: Vec<String>,
}

impl DependencyGraph {
    /// Build a graph from a batch of component specs
    ///
    /// # Errors
    ///
    /// Returns `GraphError` on duplicate names, dependencies that name
    /// components outside the batch, or declared conflicts between two
    /// batch members. Cycles are not an error here - callers decide via
    /// [`DependencyGraph::detect_cycles`] / [`DependencyGraph::ensure_acyclic`].
    pub fn build(specs: &[ComponentSpec]) -> GraphResult<Self> {
        let mut graph = DiGraph::new();
        let mut indices: HashMap<String, NodeIndex> = HashMap::new();
        let mut input_order = Vec::with_capacity(specs.len());

        for spec in specs {
            if indices.contains_key(&spec.name) {
                return Err(GraphError::DuplicateComponent {
                    name: spec.name.clone(),
                });
            }
            let index = graph.add_node(spec.name.clone());
            indices.insert(spec.name.clone(), index);
            input_order.push(spec.name.clone());
        }

        for spec in specs {
            let dependent = indices[&spec.name];
            for dep in &spec.dependencies {
                let dependency =
                    *indices
                        .get(dep)
                        .ok_or_else(|| GraphError::UnknownDependency {
                            component: spec.name.clone(),
                            dependency: dep.clone(),
                        })?;
                // Edge direction: dependency -> dependent, so topological
                // order puts dependencies first.
                graph.add_edge(dependency, dependent, ());
            }
        }

        // Declared conflicts between two members of the same batch
        for spec in specs {
            for conflict in &spec.conflicts {
                if indices.contains_key(conflict) {
                    return Err(GraphError::ConflictingComponents {
                        a: spec.name.clone(),
                        b: conflict.clone(),
                    });
                }
            }
        }

        debug!(
            "Built dependency graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            indices,
            input_order,
        })
    }

    /// Number of components in the graph
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Detect every dependency cycle, as explicit name paths
    ///
    /// Each returned path follows "depends on" direction and omits the
    /// closing repetition: `["a", "b"]` reads as a -> b -> a.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();

        for scc in tarjan_scc(&self.graph) {
            let is_cycle = scc.len() > 1
                || (scc.len() == 1 && self.graph.find_edge(scc[0], scc[0]).is_some());
            if !is_cycle {
                continue;
            }
            cycles.push(self.walk_cycle(&scc));
        }

        cycles
    }

    /// Order the nodes of a strongly connected component into a followable
    /// "depends on" path, starting from the earliest-declared member
    fn walk_cycle(&self, scc: &[NodeIndex]) -> Vec<String> {
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let start = scc
            .iter()
            .copied()
            .min_by_key(|index| self.input_position(*index))
            .expect("SCC is non-empty");

        let mut path = vec![start];
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut current = start;

        loop {
            // Incoming edges point from this node's dependencies
            let next = self
                .graph
                .neighbors_directed(current, Direction::Incoming)
                .filter(|n| members.contains(n) && !visited.contains(n))
                .min_by_key(|index| self.input_position(*index));
            match next {
                Some(node) => {
                    visited.insert(node);
                    path.push(node);
                    current = node;
                }
                None => break,
            }
        }

        path.into_iter()
            .map(|index| self.graph[index].clone())
            .collect()
    }

    /// Fail if the graph contains any cycle
    ///
    /// The error reports every cycle found; the graph is unusable for
    /// ordering until they are resolved.
    pub fn ensure_acyclic(&self) -> GraphResult<()> {
        let cycles = self.detect_cycles();
        if cycles.is_empty() {
            Ok(())
        } else {
            Err(GraphError::CyclicDependency { cycles })
        }
    }

    /// Topological install order: dependencies before dependents
    ///
    /// Deterministic: among simultaneously-ready components, the one
    /// declared earliest in the batch comes first.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::CyclicDependency` if the graph has cycles.
    pub fn topological_order(&self) -> GraphResult<Vec<String>> {
        self.ensure_acyclic()?;

        let mut in_degrees = self.in_degrees();
        let mut ready: Vec<NodeIndex> = in_degrees
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| *index)
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(position) = ready
            .iter()
            .enumerate()
            .min_by_key(|(_, index)| self.input_position(**index))
            .map(|(i, _)| i)
        {
            let node = ready.swap_remove(position);
            order.push(self.graph[node].clone());

            for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(degree) = in_degrees.get_mut(&dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }

        Ok(order)
    }

    /// Partition into maximal independent groups
    ///
    /// Every member of group N has all of its dependencies satisfied by
    /// groups 0..N, so members of one group can be processed concurrently.
    /// Group membership order follows batch declaration order.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::CyclicDependency` if the graph has cycles.
    pub fn independent_groups(&self) -> GraphResult<Vec<Vec<String>>> {
        self.ensure_acyclic()?;

        let mut in_degrees = self.in_degrees();
        let mut remaining: HashSet<NodeIndex> = self.indices.values().copied().collect();
        let mut groups = Vec::new();

        while !remaining.is_empty() {
            let mut level: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|index| in_degrees[index] == 0)
                .collect();
            level.sort_by_key(|index| self.input_position(*index));

            debug_assert!(!level.is_empty(), "acyclic graph always has a ready node");
            for node in &level {
                remaining.remove(node);
                for dependent in self.graph.neighbors_directed(*node, Direction::Outgoing) {
                    if let Some(degree) = in_degrees.get_mut(&dependent) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }

            groups.push(
                level
                    .into_iter()
                    .map(|index| self.graph[index].clone())
                    .collect(),
            );
        }

        Ok(groups)
    }

    /// Direct dependencies of a component
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        match self.indices.get(name) {
            Some(index) => self
                .graph
                .neighbors_directed(*index, Direction::Incoming)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Transitive dependents of a component (everything that would be
    /// skipped if it failed)
    pub fn transitive_dependents(&self, name: &str) -> Vec<String> {
        let start = match self.indices.get(name) {
            Some(index) => *index,
            None => return Vec::new(),
        };

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut frontier = vec![start];
        while let Some(current) = frontier.pop() {
            for dependent in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if seen.insert(dependent) {
                    frontier.push(dependent);
                }
            }
        }

        let mut names: Vec<String> = seen
            .into_iter()
            .map(|index| self.graph[index].clone())
            .collect();
        names.sort_by_key(|n| self.input_order.iter().position(|o| o == n));
        names
    }

    fn in_degrees(&self) -> HashMap<NodeIndex, usize> {
        self.indices
            .values()
            .map(|index| {
                (
                    *index,
                    self.graph
                        .neighbors_directed(*index, Direction::Incoming)
                        .count(),
                )
            })
            .collect()
    }

    fn input_position(&self, index: NodeIndex) -> usize {
        let name = &self.graph[index];
        self.input_order
            .iter()
            .position(|n| n == name)
            .unwrap_or(usize::MAX)
    }
}
