//! Field dependency graph.
//!
//! Records "downstream is computed from upstream" edges across module
//! boundaries. The graph is diagnostic: recomputation is driven by store
//! listeners, not by walking it. What it does enforce is acyclicity, so a
//! dependency loop surfaces when it is registered instead of as unbounded
//! re-entrant recalculation at runtime.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use thiserror::Error;

/// Errors that can occur while registering dependencies.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("Field {0} cannot depend on itself")]
    SelfDependency(String),

    #[error("Dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// A single "downstream depends on upstream" edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub upstream: String,
    pub downstream: String,
    pub note: String,
}

/// Directed dependency graph over field names.
///
/// Field names are universe-agnostic: both universes evaluate the same
/// schema, so one graph describes both.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// upstream -> downstream -> note
    downstream: BTreeMap<String, BTreeMap<String, String>>,

    /// downstream -> upstream set
    upstream: BTreeMap<String, BTreeSet<String>>,

    /// Every field mentioned by an edge or registered on its own.
    nodes: BTreeSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `downstream` as computed from `upstream`.
    ///
    /// Re-registering an existing edge is a no-op apart from updating the
    /// note. An edge that would close a cycle is refused and the graph is
    /// left unchanged.
    pub fn add_edge(
        &mut self,
        upstream: impl Into<String>,
        downstream: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<(), GraphError> {
        let upstream = upstream.into();
        let downstream = downstream.into();

        if upstream == downstream {
            return Err(GraphError::SelfDependency(upstream));
        }

        if !self.has_edge(&upstream, &downstream) {
            // A path downstream ~> upstream plus the new edge is a cycle.
            if let Some(mut path) = self.path_between(&downstream, &upstream) {
                path.push(downstream.clone());
                return Err(GraphError::Cycle { path });
            }
        }

        self.insert_edge(upstream, downstream, note.into());
        Ok(())
    }

    fn insert_edge(&mut self, upstream: String, downstream: String, note: String) {
        self.nodes.insert(upstream.clone());
        self.nodes.insert(downstream.clone());
        self.upstream
            .entry(downstream.clone())
            .or_default()
            .insert(upstream.clone());
        self.downstream
            .entry(upstream)
            .or_default()
            .insert(downstream, note);
    }

    pub fn has_edge(&self, upstream: &str, downstream: &str) -> bool {
        self.downstream
            .get(upstream)
            .is_some_and(|d| d.contains_key(downstream))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.nodes.contains(field)
    }

    /// Fields `field` is directly computed from.
    pub fn upstream_of(&self, field: &str) -> Vec<String> {
        self.upstream
            .get(field)
            .map(|u| u.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Fields directly computed from `field`.
    pub fn downstream_of(&self, field: &str) -> Vec<String> {
        self.downstream
            .get(field)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Transitive upstream closure of `field`.
    pub fn ancestors(&self, field: &str) -> BTreeSet<String> {
        Self::closure(field, |f| self.upstream_of(f))
    }

    /// Transitive downstream closure of `field`: everything that must be
    /// recomputed when `field` changes.
    pub fn descendants(&self, field: &str) -> BTreeSet<String> {
        Self::closure(field, |f| self.downstream_of(f))
    }

    fn closure<F>(start: &str, next: F) -> BTreeSet<String>
    where
        F: Fn(&str) -> Vec<String>,
    {
        let mut result = BTreeSet::new();
        let mut queue: VecDeque<String> = next(start).into();

        while let Some(current) = queue.pop_front() {
            if result.insert(current.clone()) {
                queue.extend(next(&current));
            }
        }

        result
    }

    /// Shortest downstream path `from` ~> `to`, both ends included.
    fn path_between(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut came_from: HashMap<String, String> = HashMap::new();
        let mut queue = VecDeque::from([from.to_string()]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current.clone()];
                let mut cursor = current;
                while let Some(prev) = came_from.get(&cursor) {
                    path.push(prev.clone());
                    cursor = prev.clone();
                }
                path.reverse();
                return Some(path);
            }
            for next in self.downstream_of(&current) {
                if next != from && !came_from.contains_key(&next) {
                    came_from.insert(next.clone(), current.clone());
                    queue.push_back(next);
                }
            }
        }

        None
    }

    /// All fields in dependency order (upstream before downstream).
    ///
    /// Fields that sit on a cycle are omitted; compare the length with
    /// [`DependencyGraph::len`] or call [`DependencyGraph::find_cycle`].
    pub fn topological_order(&self) -> Vec<String> {
        // Kahn's algorithm; BTree iteration keeps the order deterministic.
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut queue = VecDeque::new();

        for field in &self.nodes {
            let degree = self.upstream.get(field).map_or(0, BTreeSet::len);
            in_degree.insert(field.as_str(), degree);
            if degree == 0 {
                queue.push_back(field.as_str());
            }
        }

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(field) = queue.pop_front() {
            result.push(field.to_string());

            if let Some(children) = self.downstream.get(field) {
                for child in children.keys() {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(child.as_str());
                        }
                    }
                }
            }
        }

        result
    }

    /// Fields affected by a change to any of `changed`, in recompute order.
    pub fn recompute_order<S: AsRef<str>>(&self, changed: &[S]) -> Vec<String> {
        let mut affected = BTreeSet::new();
        for field in changed {
            affected.extend(self.descendants(field.as_ref()));
        }
        self.topological_order()
            .into_iter()
            .filter(|f| affected.contains(f))
            .collect()
    }

    /// Find one cycle, if any, as a closed path (first == last).
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            field: &str,
            marks: &mut HashMap<String, Mark>,
            stack: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            marks.insert(field.to_string(), Mark::Visiting);
            stack.push(field.to_string());

            for next in graph.downstream_of(field) {
                match marks.get(&next) {
                    Some(Mark::Visiting) => {
                        let start = stack.iter().position(|f| *f == next).unwrap_or(0);
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(cycle) = visit(graph, &next, marks, stack) {
                            return Some(cycle);
                        }
                    }
                }
            }

            stack.pop();
            marks.insert(field.to_string(), Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        for field in &self.nodes {
            if !marks.contains_key(field) {
                let mut stack = Vec::new();
                if let Some(cycle) = visit(self, field, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    pub fn is_acyclic(&self) -> bool {
        self.find_cycle().is_none()
    }

    /// All edges, ordered by upstream then downstream.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.downstream
            .iter()
            .flat_map(|(up, downs)| {
                downs.iter().map(move |(down, note)| DependencyEdge {
                    upstream: up.clone(),
                    downstream: down.clone(),
                    note: note.clone(),
                })
            })
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.downstream.values().map(BTreeMap::len).sum()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get statistics about the graph.
    pub fn stats(&self) -> GraphStats {
        let roots = self
            .nodes
            .iter()
            .filter(|f| self.upstream.get(*f).map_or(true, BTreeSet::is_empty))
            .count();
        let leaves = self
            .nodes
            .iter()
            .filter(|f| self.downstream.get(*f).map_or(true, BTreeMap::is_empty))
            .count();

        GraphStats {
            total_fields: self.nodes.len(),
            total_edges: self.edge_count(),
            root_count: roots,
            leaf_count: leaves,
            max_depth: self.compute_max_depth(),
        }
    }

    /// Longest upstream chain, counted in fields.
    fn compute_max_depth(&self) -> usize {
        let mut depths: HashMap<String, usize> = HashMap::new();

        for field in self.topological_order() {
            let parent_depth = self
                .upstream
                .get(&field)
                .into_iter()
                .flatten()
                .filter_map(|p| depths.get(p))
                .max()
                .copied()
                .unwrap_or(0);
            depths.insert(field, parent_depth + 1);
        }

        depths.values().max().copied().unwrap_or(0)
    }
}

/// Statistics about a dependency graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphStats {
    pub total_fields: usize,
    pub total_edges: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupancy_chain() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph
            .add_edge("dailyHours", "annualOccupiedHours", "hours x 365")
            .unwrap();
        graph
            .add_edge("annualOccupiedHours", "occupantGains", "gains over occupied hours")
            .unwrap();
        graph
            .add_edge("occupants", "occupantGains", "per-person gains")
            .unwrap();
        graph
    }

    #[test]
    fn test_linear_chain() {
        let graph = occupancy_chain();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(
            graph.ancestors("occupantGains"),
            BTreeSet::from([
                "annualOccupiedHours".to_string(),
                "dailyHours".to_string(),
                "occupants".to_string()
            ])
        );
        assert_eq!(
            graph.descendants("dailyHours"),
            BTreeSet::from([
                "annualOccupiedHours".to_string(),
                "occupantGains".to_string()
            ])
        );
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut graph = DependencyGraph::new();
        assert_eq!(
            graph.add_edge("area", "area", ""),
            Err(GraphError::SelfDependency("area".into()))
        );
        assert!(graph.is_empty());
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let mut graph = occupancy_chain();
        let err = graph
            .add_edge("occupantGains", "dailyHours", "feedback")
            .unwrap_err();

        match err {
            GraphError::Cycle { path } => {
                assert_eq!(path.first().map(String::as_str), Some("dailyHours"));
                assert_eq!(path.last().map(String::as_str), Some("dailyHours"));
                assert!(path.contains(&"occupantGains".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(!graph.has_edge("occupantGains", "dailyHours"));
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_reregistering_edge_is_idempotent() {
        let mut graph = occupancy_chain();
        graph
            .add_edge("dailyHours", "annualOccupiedHours", "updated note")
            .unwrap();
        assert_eq!(graph.edge_count(), 3);
        let edge = graph
            .edges()
            .into_iter()
            .find(|e| e.upstream == "dailyHours")
            .unwrap();
        assert_eq!(edge.note, "updated note");
    }

    #[test]
    fn test_topological_order() {
        let graph = occupancy_chain();
        let order = graph.topological_order();
        let pos = |f: &str| order.iter().position(|o| o == f).unwrap();

        assert!(pos("dailyHours") < pos("annualOccupiedHours"));
        assert!(pos("annualOccupiedHours") < pos("occupantGains"));
        assert!(pos("occupants") < pos("occupantGains"));
    }

    #[test]
    fn test_recompute_order() {
        let graph = occupancy_chain();
        assert_eq!(
            graph.recompute_order(&["dailyHours"]),
            vec!["annualOccupiedHours".to_string(), "occupantGains".to_string()]
        );
        assert!(graph.recompute_order(&["occupantGains"]).is_empty());
    }

    #[test]
    fn test_graph_stats() {
        let graph = occupancy_chain();
        let stats = graph.stats();
        assert_eq!(stats.total_fields, 4);
        assert_eq!(stats.total_edges, 3);
        assert_eq!(stats.root_count, 2);
        assert_eq!(stats.leaf_count, 1);
        assert_eq!(stats.max_depth, 3);
    }
}
