//! Dependency graph and generation-order resolution.
//!
//! Nodes are entity-type identifiers (any `Eq + Hash + Clone` value type
//! works; correctness rests on stable identity across insertion, lookup and
//! removal). An edge A→B reads "A depends on B": B must be fully
//! materialized before A, because A's relationship triples point at B's
//! identifiers.
//!
//! Resolution is repeated extraction: pick a node with zero unresolved
//! outgoing dependencies, schedule it, strike it from everyone else's
//! dependency lists, repeat. Ties break by registration order, so a graph
//! built the same way always resolves the same way. The linear scan per
//! extraction is O(V²); type counts are tens to low hundreds, which keeps
//! that comfortably cheap.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;
use tracing::warn;

/// No dependency-free node exists while the graph is non-empty: a cycle.
/// Carries every node still unresolved when extraction stalled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle among unresolved nodes: {remaining:?}")]
pub struct CycleError<T: Debug> {
    pub remaining: Vec<T>,
}

/// Directed dependency graph, consumed destructively by [`resolve`].
///
/// Invariants: a node present in the outgoing map is present in the incoming
/// map and vice versa; both endpoints of an edge are registered nodes; a
/// self-edge is rejected at insertion and never stored.
///
/// [`resolve`]: DependencyGraph::resolve
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph<T> {
    /// node -> nodes it depends on
    outgoing: HashMap<T, Vec<T>>,
    /// node -> nodes depending on it
    incoming: HashMap<T, Vec<T>>,
    /// Registration order; drives deterministic extraction.
    order: Vec<T>,
}

impl<T> DependencyGraph<T>
where
    T: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a node. Idempotent.
    pub fn add_node(&mut self, node: T) {
        if self.outgoing.contains_key(&node) {
            return;
        }
        self.outgoing.insert(node.clone(), Vec::new());
        self.incoming.insert(node.clone(), Vec::new());
        self.order.push(node);
    }

    /// Declare that `from` depends on `to`. Returns true when the edge was
    /// added.
    ///
    /// A self-dependency is not a cycle: it is rejected here with a warning
    /// and the edge set is left unchanged. Edges between unregistered nodes
    /// are rejected the same way, since scheduling an unregistered endpoint
    /// is impossible.
    pub fn add_dependency(&mut self, from: &T, to: &T) -> bool {
        if from == to {
            warn!(node = ?from, "self-dependency declared; edge dropped");
            return false;
        }
        if !self.outgoing.contains_key(from) || !self.outgoing.contains_key(to) {
            warn!(from = ?from, to = ?to, "dependency between unregistered nodes; edge dropped");
            return false;
        }
        let deps = self.outgoing.entry(from.clone()).or_default();
        if deps.contains(to) {
            return false;
        }
        deps.push(to.clone());
        self.incoming.entry(to.clone()).or_default().push(from.clone());
        true
    }

    pub fn contains_node(&self, node: &T) -> bool {
        self.outgoing.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.order.iter()
    }

    /// What `node` still depends on.
    pub fn dependencies_of(&self, node: &T) -> &[T] {
        self.outgoing.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Produce a generation order: for every edge A→B, B comes strictly
    /// before A. Consumes the graph (nodes are removed as they are
    /// scheduled).
    pub fn resolve(mut self) -> Result<Vec<T>, CycleError<T>> {
        let mut scheduled = Vec::with_capacity(self.order.len());
        let mut remaining = std::mem::take(&mut self.order);

        while !remaining.is_empty() {
            let position = remaining
                .iter()
                .position(|n| self.outgoing.get(n).map_or(true, Vec::is_empty));
            let Some(position) = position else {
                return Err(CycleError { remaining });
            };

            let node = remaining.remove(position);
            self.outgoing.remove(&node);
            if let Some(dependents) = self.incoming.remove(&node) {
                for dependent in dependents {
                    if let Some(deps) = self.outgoing.get_mut(&dependent) {
                        deps.retain(|d| *d != node);
                    }
                }
            }
            scheduled.push(node);
        }

        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph<String> {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(n.to_string());
        }
        for (from, to) in edges {
            g.add_dependency(&from.to_string(), &to.to_string());
        }
        g
    }

    fn index_of(order: &[String], node: &str) -> usize {
        order
            .iter()
            .position(|n| n == node)
            .unwrap_or_else(|| panic!("{node} missing from {order:?}"))
    }

    #[test]
    fn dependencies_come_first() {
        let g = graph(
            &["item", "tag", "shelf"],
            &[("item", "tag"), ("shelf", "item")],
        );
        let order = g.resolve().unwrap();
        assert!(index_of(&order, "tag") < index_of(&order, "item"));
        assert!(index_of(&order, "item") < index_of(&order, "shelf"));
    }

    #[test]
    fn free_nodes_keep_registration_order() {
        let g = graph(&["c", "a", "b"], &[]);
        assert_eq!(g.resolve().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn self_dependency_is_dropped_not_fatal() {
        let mut g = graph(&["a", "b"], &[("a", "b")]);
        assert_eq!(g.edge_count(), 1);
        assert!(!g.add_dependency(&"a".to_string(), &"a".to_string()));
        assert_eq!(g.edge_count(), 1);
        // Still resolvable, and b still precedes a.
        let order = g.resolve().unwrap();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn duplicate_edges_are_not_doubled() {
        let mut g = graph(&["a", "b"], &[("a", "b")]);
        assert!(!g.add_dependency(&"a".to_string(), &"b".to_string()));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn unregistered_endpoints_are_rejected() {
        let mut g = graph(&["a"], &[]);
        assert!(!g.add_dependency(&"a".to_string(), &"ghost".to_string()));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn cycle_reports_remaining_nodes() {
        let g = graph(
            &["a", "b", "free"],
            &[("a", "b"), ("b", "a")],
        );
        let err = g.resolve().unwrap_err();
        // `free` schedules fine; the two-cycle is reported.
        let mut remaining = err.remaining.clone();
        remaining.sort();
        assert_eq!(remaining, vec!["a", "b"]);
        assert!(err.to_string().contains("dependency cycle"));
    }

    #[test]
    fn repeated_resolution_is_deterministic() {
        let build = || {
            graph(
                &["d", "b", "a", "c"],
                &[("a", "b"), ("a", "c"), ("d", "c")],
            )
        };
        let first = build().resolve().unwrap();
        for _ in 0..10 {
            assert_eq!(build().resolve().unwrap(), first);
        }
    }

    #[test]
    fn diamond_resolves() {
        // a depends on b and c, both depend on d.
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        let order = g.resolve().unwrap();
        assert_eq!(index_of(&order, "d"), 0);
        assert_eq!(index_of(&order, "a"), 3);
    }
}
