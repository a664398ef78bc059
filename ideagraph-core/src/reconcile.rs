// Copyright 2025 Ideagraph Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Graph reconciliation
//!
//! Folds partial snapshots into one cumulative [`GraphState`]:
//!
//! 1. **Guard**: a snapshot with no nodes and no edges changes nothing
//! 2. **Nodes**: insert or overwrite by id (wholesale, no field merge)
//! 3. **Edges**: previously deferred edges first, then incoming ones; an
//!    edge with both endpoints known is inserted or overwritten in place by
//!    (source, target), otherwise it is deferred
//! 4. **Metadata**: shallow key-wise overwrite
//!
//! Nothing that was accepted is ever removed, so node and edge counts only
//! grow during a session. Merging the same snapshot twice is the same as
//! merging it once.

use crate::model::{upsert_by_key, Edge, GraphState};
use std::sync::Arc;
use tracing::debug;

/// Merge `incoming` into a copy of `current`
pub fn merge(current: &GraphState, incoming: &GraphState) -> GraphState {
    if incoming.is_empty() {
        return current.clone();
    }

    let mut merged = current.clone();
    if merged.concept.is_empty() {
        merged.concept = incoming.concept.clone();
    }

    for node in incoming.nodes() {
        merged.upsert_node(node.clone());
    }

    // Deferred edges arrived earlier, so they go first; an incoming edge
    // with the same identity replaces the deferred one in place.
    let mut candidates = std::mem::take(&mut merged.pending_edges);
    for edge in incoming.edges().iter().chain(incoming.pending_edges()) {
        upsert_by_key(&mut candidates, edge.clone());
    }

    for edge in candidates {
        if resolves(&merged, &edge) {
            merged.upsert_edge(edge);
        } else {
            merged.pending_edges.push(edge);
        }
    }

    for (key, value) in &incoming.metadata {
        merged.metadata.insert(key.clone(), value.clone());
    }

    debug!(
        nodes = merged.node_count(),
        edges = merged.edge_count(),
        deferred = merged.pending_edges.len(),
        "merged snapshot"
    );
    merged
}

fn resolves(graph: &GraphState, edge: &Edge) -> bool {
    graph.contains_node(&edge.source_node_id) && graph.contains_node(&edge.target_node_id)
}

/// Owner of the cumulative graph for one session
///
/// Each accepted snapshot produces a new shared version; readers hold an
/// `Arc` to the version they were given and never see it change.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    state: Arc<GraphState>,
    version: u64,
}

impl Reconciler {
    pub fn new(concept: impl Into<String>) -> Self {
        Self {
            state: Arc::new(GraphState::new(concept)),
            version: 0,
        }
    }

    /// Merge a snapshot; returns true when the graph changed
    pub fn apply(&mut self, incoming: &GraphState) -> bool {
        let merged = merge(&self.state, incoming);
        if merged == *self.state {
            return false;
        }
        self.state = Arc::new(merged);
        self.version += 1;
        true
    }

    /// Current version, borrowed
    pub fn state(&self) -> &GraphState {
        &self.state
    }

    /// Current version, shared
    pub fn snapshot(&self) -> Arc<GraphState> {
        Arc::clone(&self.state)
    }

    /// Number of changes applied since the last reset
    pub fn version(&self) -> u64 {
        self.version
    }

    /// End the session: deferred edges that never resolved are dropped
    pub fn finish(&mut self) -> Arc<GraphState> {
        if !self.state.pending_edges.is_empty() {
            let mut last = (*self.state).clone();
            let dropped = std::mem::take(&mut last.pending_edges);
            debug!(
                dropped = dropped.len(),
                "discarding edges whose endpoints never arrived"
            );
            self.state = Arc::new(last);
        }
        self.snapshot()
    }

    /// Start over with an empty graph
    pub fn reset(&mut self, concept: impl Into<String>) {
        self.state = Arc::new(GraphState::new(concept));
        self.version = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use serde_json::json;

    fn node(id: &str) -> Node {
        Node::new(id, format!("period of {}", id))
    }

    fn snapshot(nodes: &[&str], edges: &[(&str, &str)]) -> GraphState {
        GraphState::from_parts(
            "concept",
            nodes.iter().map(|id| node(id)),
            edges.iter().map(|(s, t)| Edge::new(*s, *t)),
        )
    }

    #[test]
    fn test_empty_snapshot_is_noop() {
        let mut current = snapshot(&["a", "b"], &[("a", "b")]);
        current.metadata.insert("k".into(), json!(1));

        let mut empty = GraphState::new("other");
        empty.metadata.insert("k".into(), json!(2));

        assert_eq!(merge(&current, &empty), current);
    }

    #[test]
    fn test_nodes_overwrite_wholesale_and_keep_slot() {
        let current = snapshot(&["a", "b"], &[]);
        let update = GraphState::from_parts(
            "concept",
            vec![Node::new("a", "rewritten").with_region("Athens"), node("c")],
            Vec::new(),
        );

        let merged = merge(&current, &update);
        assert_eq!(merged.node_ids(), ["a", "b", "c"].map(String::from));
        let a = merged.node("a").unwrap();
        assert_eq!(a.time_period, "rewritten");
        assert_eq!(a.region, "Athens");
    }

    #[test]
    fn test_edges_update_in_place() {
        let current = snapshot(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let update = GraphState::from_parts(
            "concept",
            Vec::new(),
            vec![Edge::new("a", "b").with_description("revised").with_weight(3.0)],
        );

        let merged = merge(&current, &update);
        assert_eq!(merged.edge_count(), 2);
        assert_eq!(merged.edges()[0].change_description, "revised");
        assert_eq!(merged.edges()[0].weight, 3.0);
        assert_eq!(merged.edges()[1].key().source, "b");
    }

    #[test]
    fn test_omission_is_not_deletion() {
        let current = snapshot(&["a", "b"], &[("a", "b")]);
        let partial = snapshot(&["c"], &[]);

        let merged = merge(&current, &partial);
        assert_eq!(merged.node_count(), 3);
        assert_eq!(merged.edge_count(), 1);
    }

    #[test]
    fn test_deferred_edge_resolves_when_nodes_arrive() {
        let start = GraphState::new("concept");
        let edge_first = snapshot(&[], &[("a", "b")]);
        let nodes_later = snapshot(&["a", "b"], &[]);

        let step1 = merge(&start, &edge_first);
        assert_eq!(step1.edge_count(), 0);
        assert_eq!(step1.pending_edges().len(), 1);

        let step2 = merge(&step1, &nodes_later);
        assert_eq!(step2.edge_count(), 1);
        assert!(step2.pending_edges().is_empty());
        assert!(step2.edge("a", "b").is_some());
    }

    #[test]
    fn test_unresolved_edges_dropped_on_finish() {
        let mut reconciler = Reconciler::new("concept");
        assert!(reconciler.apply(&snapshot(&[], &[("a", "b")])));

        let last = reconciler.finish();
        assert_eq!(last.edge_count(), 0);
        assert!(last.pending_edges().is_empty());
    }

    #[test]
    fn test_pending_edge_replaced_by_later_copy() {
        let start = GraphState::new("concept");
        let first = GraphState::from_parts(
            "concept",
            Vec::new(),
            vec![Edge::new("a", "b").with_description("old")],
        );
        let second = GraphState::from_parts(
            "concept",
            vec![node("a"), node("b")],
            vec![Edge::new("a", "b").with_description("new")],
        );

        let merged = merge(&merge(&start, &first), &second);
        assert_eq!(merged.edge_count(), 1);
        assert_eq!(merged.edges()[0].change_description, "new");
    }

    #[test]
    fn test_concept_adopted_only_when_unset() {
        let blank = merge(&GraphState::default(), &snapshot(&["a"], &[]));
        assert_eq!(blank.concept, "concept");

        let mut incoming = snapshot(&["b"], &[]);
        incoming.concept = "something else".into();
        let kept = merge(&blank, &incoming);
        assert_eq!(kept.concept, "concept");
    }

    #[test]
    fn test_metadata_last_write_wins() {
        let mut current = snapshot(&["a"], &[]);
        current.metadata.insert("stage".into(), json!("search"));
        current.metadata.insert("keep".into(), json!(true));

        let mut incoming = snapshot(&["a"], &[]);
        incoming.metadata.insert("stage".into(), json!("merge"));

        let merged = merge(&current, &incoming);
        assert_eq!(merged.metadata["stage"], json!("merge"));
        assert_eq!(merged.metadata["keep"], json!(true));
    }

    #[test]
    fn test_original_is_not_mutated() {
        let current = snapshot(&["a"], &[]);
        let before = current.clone();
        let _ = merge(&current, &snapshot(&["b"], &[("a", "b")]));
        assert_eq!(current, before);
    }

    #[test]
    fn test_reconciler_reports_changes_and_resets() {
        let mut reconciler = Reconciler::new("concept");
        let update = snapshot(&["a"], &[]);

        assert!(reconciler.apply(&update));
        assert!(!reconciler.apply(&update));
        assert_eq!(reconciler.version(), 1);

        let held = reconciler.snapshot();
        reconciler.reset("next");
        assert_eq!(held.node_count(), 1);
        assert!(reconciler.state().is_empty());
        assert_eq!(reconciler.state().concept, "next");
    }
}
