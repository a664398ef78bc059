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

//! Graph digests: counts for status lines and a plain-text summary for
//! prompts and terminal output.

use crate::model::GraphState;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

const NO_NODES: &str = "No developments recorded yet";
const NO_EDGES: &str = "No evolution paths recorded yet";

/// Graph statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// Edges waiting for an endpoint to arrive
    pub deferred_edge_count: usize,
    pub avg_out_degree: f64,
    /// Edges over possible directed edges, zero below two nodes
    pub density: f64,
    /// Nodes per non-empty region
    pub regions: BTreeMap<String, usize>,
}

impl GraphState {
    pub fn stats(&self) -> GraphStats {
        let node_count = self.node_count();
        let edge_count = self.edge_count();

        let mut regions = BTreeMap::new();
        for node in self.nodes() {
            if !node.region.is_empty() {
                *regions.entry(node.region.clone()).or_insert(0) += 1;
            }
        }

        let avg_out_degree = if node_count > 0 {
            edge_count as f64 / node_count as f64
        } else {
            0.0
        };
        let possible = node_count.saturating_mul(node_count.saturating_sub(1));
        let density = if possible > 0 {
            edge_count as f64 / possible as f64
        } else {
            0.0
        };

        GraphStats {
            node_count,
            edge_count,
            deferred_edge_count: self.pending_edges().len(),
            avg_out_degree,
            density,
            regions,
        }
    }

    /// Plain-text digest of the graph
    ///
    /// One block per node in first-seen order, then one line per edge.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Current Understanding of {}:", self.concept);
        out.push_str("\n### Key Developments ###\n");

        if self.node_count() == 0 {
            out.push_str(NO_NODES);
            out.push('\n');
        } else {
            let separator = "-".repeat(50);
            for (i, node) in self.nodes().enumerate() {
                if i > 0 {
                    out.push_str(&separator);
                    out.push('\n');
                }
                let _ = writeln!(out, "Node ID: {}", node.id);
                let _ = writeln!(out, "Time: {}", node.time_period);
                let _ = writeln!(out, "Region: {}", node.region);
                let _ = writeln!(out, "Key figures: {}", node.key_contributors.join(", "));
                let _ = writeln!(out, "Summary: {}", node.main_idea_summary);
            }
        }

        out.push_str("\n### Evolution ###\n");
        if self.edges().is_empty() {
            out.push_str(NO_EDGES);
            out.push('\n');
        } else {
            for edge in self.edges() {
                let _ = writeln!(
                    out,
                    "Evolution: {} -> {}: {}",
                    edge.source_node_id, edge.target_node_id, edge.change_description
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Edge, GraphState, Node};

    fn sample() -> GraphState {
        GraphState::from_parts(
            "democracy",
            [
                Node::new("athens", "5th century BCE")
                    .with_region("Greece")
                    .with_contributors(["Cleisthenes", "Pericles"])
                    .with_summary("Direct democracy among citizens"),
                Node::new("rome", "509 BCE").with_region("Italy"),
                Node::new("magna", "1215").with_region("England"),
                Node::new("polis", "").with_region("Greece"),
            ],
            [
                Edge::new("athens", "rome").with_description("Representation"),
                Edge::new("rome", "magna"),
            ],
        )
    }

    #[test]
    fn test_stats() {
        let stats = sample().stats();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 2);
        assert_eq!(stats.deferred_edge_count, 0);
        assert!((stats.avg_out_degree - 0.5).abs() < 1e-9);
        assert!((stats.density - 2.0 / 12.0).abs() < 1e-9);
        assert_eq!(stats.regions.get("Greece"), Some(&2));
        assert_eq!(stats.regions.len(), 3);
    }

    #[test]
    fn test_stats_empty_graph() {
        let stats = GraphState::new("x").stats();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.density, 0.0);
        assert_eq!(stats.avg_out_degree, 0.0);
    }

    #[test]
    fn test_summary() {
        let text = sample().summary();
        assert!(text.starts_with("Current Understanding of democracy:"));
        assert!(text.contains("Key figures: Cleisthenes, Pericles"));
        assert!(text.contains("Evolution: athens -> rome: Representation"));
        assert!(text.find("Node ID: athens") < text.find("Node ID: rome"));
    }

    #[test]
    fn test_summary_placeholders() {
        let text = GraphState::new("x").summary();
        assert!(text.contains("No developments recorded yet"));
        assert!(text.contains("No evolution paths recorded yet"));
    }
}
