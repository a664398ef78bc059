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

//! Property-based tests for merging and layout
//!
//! Invariants that hold for any snapshot sequence:
//! - Idempotence: merging a snapshot twice equals merging it once
//! - Monotonicity: accepted nodes and edges are never lost
//! - Empty snapshots change nothing
//! - Layout is deterministic and ranks respect every non-cycle edge

use ideagraph_core::{merge, Edge, EdgeKey, GraphState, LayoutEngine, Node};
use proptest::prelude::*;

const IDS: &[&str] = &["a", "b", "c", "d", "e", "f"];

fn node_strategy() -> impl Strategy<Value = Node> {
    (0..IDS.len(), "[a-z]{0,6}", proptest::option::of(-500i64..2025)).prop_map(
        |(i, period, year)| {
            let node = Node::new(IDS[i], period);
            match year {
                Some(year) => node.with_year(year),
                None => node,
            }
        },
    )
}

fn edge_strategy() -> impl Strategy<Value = Edge> {
    (0..IDS.len(), 0..IDS.len(), "[a-z ]{0,8}").prop_map(|(s, t, description)| {
        Edge::new(IDS[s], IDS[t]).with_description(description)
    })
}

fn snapshot_strategy() -> impl Strategy<Value = GraphState> {
    (
        proptest::collection::vec(node_strategy(), 0..5),
        proptest::collection::vec(edge_strategy(), 0..6),
    )
        .prop_map(|(nodes, edges)| GraphState::from_parts("concept", nodes, edges))
}

fn fold(snapshots: &[GraphState]) -> GraphState {
    snapshots
        .iter()
        .fold(GraphState::default(), |state, snapshot| merge(&state, snapshot))
}

proptest! {
    #[test]
    fn prop_merge_is_idempotent(
        history in proptest::collection::vec(snapshot_strategy(), 0..4),
        snapshot in snapshot_strategy(),
    ) {
        let base = fold(&history);
        let once = merge(&base, &snapshot);
        let twice = merge(&once, &snapshot);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_accepted_items_are_never_lost(
        snapshots in proptest::collection::vec(snapshot_strategy(), 1..6),
    ) {
        let mut state = GraphState::default();
        for snapshot in &snapshots {
            let next = merge(&state, snapshot);
            prop_assert!(next.node_count() >= state.node_count());
            prop_assert!(next.edge_count() >= state.edge_count());
            for id in state.node_ids() {
                prop_assert!(next.contains_node(id));
            }
            for edge in state.edges() {
                prop_assert!(next.edge(&edge.source_node_id, &edge.target_node_id).is_some());
            }
            state = next;
        }
    }

    #[test]
    fn prop_accepted_edges_have_both_endpoints(
        snapshots in proptest::collection::vec(snapshot_strategy(), 1..6),
    ) {
        let state = fold(&snapshots);
        for edge in state.edges() {
            prop_assert!(state.contains_node(&edge.source_node_id));
            prop_assert!(state.contains_node(&edge.target_node_id));
        }
    }

    #[test]
    fn prop_empty_snapshot_is_noop(
        snapshots in proptest::collection::vec(snapshot_strategy(), 0..4),
    ) {
        let state = fold(&snapshots);
        prop_assert_eq!(merge(&state, &GraphState::new("other")), state);
    }

    #[test]
    fn prop_layout_is_deterministic_and_layered(
        snapshots in proptest::collection::vec(snapshot_strategy(), 1..5),
    ) {
        let state = fold(&snapshots);
        let engine = LayoutEngine::default();
        let first = engine.layout(&state);
        let second = engine.layout(&state.clone());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.nodes.len(), state.node_count());

        for edge in state.edges() {
            let key = EdgeKey::new(edge.source_node_id.clone(), edge.target_node_id.clone());
            if first.cycle_edges.contains(&key) {
                continue;
            }
            let source = first.rank(&edge.source_node_id).unwrap();
            let target = first.rank(&edge.target_node_id).unwrap();
            prop_assert!(target > source, "{} ranked at or before {}", key, edge.source_node_id);
        }
    }
}
