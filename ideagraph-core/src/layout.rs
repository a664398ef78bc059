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

//! Layered layout
//!
//! Places the graph left to right in layers (Sugiyama-style, without the
//! crossing-minimization sweep):
//!
//! 1. **Cycle breaking**: edges are taken in first-seen order. An edge whose
//!    target already reaches its source over the edges accepted before it
//!    would close a cycle; it is marked as a cycle edge and does not affect
//!    ranking. Self-loops are always cycle edges. An edge that arrives later
//!    never displaces an earlier one, so a growing graph keeps its ranks.
//!    This is a heuristic; it does not look for a minimum set of cycle
//!    edges.
//! 2. **Ranks**: longest path from a source over the accepted edges,
//!    relaxed in topological order.
//! 3. **Order within rank**: first-seen order of the nodes, so repeated
//!    layouts of a growing graph do not reshuffle existing nodes.
//! 4. **Positions**: `x = rank * rank_spacing`, `y = order * node_spacing`.
//!
//! The engine is a pure function of (node order, edges); it is simply re-run
//! whenever the graph changes.

use crate::config::LayoutConfig;
use crate::model::{Edge, EdgeKey, GraphState};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// A point in layout space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node with its layer and coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedNode {
    pub id: String,
    /// Layer index on the primary axis
    pub rank: usize,
    /// Slot within the layer on the secondary axis
    pub order: usize,
    pub position: Position,
}

/// Axis-aligned extent of all node positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: Position,
    pub max: Position,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

/// Layout output: node coordinates plus the edges they connect
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionedGraph {
    /// Nodes in first-seen order
    pub nodes: Vec<PositionedNode>,
    /// Edges between laid-out nodes, first-seen order
    pub edges: Vec<Edge>,
    /// Edges ignored for ranking because they close a cycle
    pub cycle_edges: Vec<EdgeKey>,
}

impl PositionedGraph {
    pub fn node(&self, id: &str) -> Option<&PositionedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn position(&self, id: &str) -> Option<Position> {
        self.node(id).map(|n| n.position)
    }

    pub fn rank(&self, id: &str) -> Option<usize> {
        self.node(id).map(|n| n.rank)
    }

    /// Number of non-empty layers
    pub fn rank_count(&self) -> usize {
        self.nodes.iter().map(|n| n.rank + 1).max().unwrap_or(0)
    }

    /// Node ids per layer, each layer in slot order
    pub fn layers(&self) -> Vec<Vec<&str>> {
        let mut layers: Vec<Vec<&str>> = vec![Vec::new(); self.rank_count()];
        for node in &self.nodes {
            layers[node.rank].push(node.id.as_str());
        }
        layers
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.nodes.first()?.position;
        let bounds = self.nodes.iter().fold(
            Bounds {
                min: first,
                max: first,
            },
            |b, n| Bounds {
                min: Position {
                    x: b.min.x.min(n.position.x),
                    y: b.min.y.min(n.position.y),
                },
                max: Position {
                    x: b.max.x.max(n.position.x),
                    y: b.max.y.max(n.position.y),
                },
            },
        );
        Some(bounds)
    }
}

/// Layered layout engine
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out the accepted nodes and edges of a graph
    pub fn layout(&self, graph: &GraphState) -> PositionedGraph {
        self.layout_parts(graph.node_ids(), graph.edges())
    }

    /// Lay out nodes given in first-seen order and the edges between them
    ///
    /// Repeated ids keep their first slot. Edges naming an id that is not in
    /// `node_ids` are left out.
    pub fn layout_parts(&self, node_ids: &[String], edges: &[Edge]) -> PositionedGraph {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(node_ids.len());
        let mut ids: Vec<&str> = Vec::with_capacity(node_ids.len());
        for id in node_ids {
            if !index.contains_key(id.as_str()) {
                index.insert(id.as_str(), ids.len());
                ids.push(id.as_str());
            }
        }
        let n = ids.len();

        // (source, target) per laid-out edge, in first-seen order
        let mut links: Vec<(usize, usize)> = Vec::with_capacity(edges.len());
        let mut laid_out = Vec::with_capacity(edges.len());
        for (ei, edge) in edges.iter().enumerate() {
            let (Some(&u), Some(&v)) = (
                index.get(edge.source_node_id.as_str()),
                index.get(edge.target_node_id.as_str()),
            ) else {
                continue;
            };
            links.push((u, v));
            laid_out.push(ei);
        }

        let (cycle, accepted) = break_cycles(n, &links);

        let mut rank = vec![0usize; n];
        for u in topological_order(&accepted) {
            for &v in &accepted[u] {
                rank[v] = rank[v].max(rank[u] + 1);
            }
        }

        let mut filled: Vec<usize> = Vec::new();
        let nodes: Vec<PositionedNode> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let r = rank[i];
                if filled.len() <= r {
                    filled.resize(r + 1, 0);
                }
                let order = filled[r];
                filled[r] += 1;
                PositionedNode {
                    id: (*id).to_string(),
                    rank: r,
                    order,
                    position: self.position(r, order),
                }
            })
            .collect();

        let cycle_edges: Vec<EdgeKey> = laid_out
            .iter()
            .zip(&cycle)
            .filter(|(_, is_cycle)| **is_cycle)
            .map(|(&ei, _)| edges[ei].key())
            .collect();

        debug!(
            nodes = nodes.len(),
            edges = laid_out.len(),
            ranks = filled.len(),
            cycle_edges = cycle_edges.len(),
            "computed layout"
        );

        PositionedGraph {
            nodes,
            edges: laid_out.into_iter().map(|ei| edges[ei].clone()).collect(),
            cycle_edges,
        }
    }

    fn position(&self, rank: usize, order: usize) -> Position {
        Position {
            x: self.config.origin_x + rank as f64 * self.config.rank_spacing,
            y: self.config.origin_y + order as f64 * self.config.node_spacing,
        }
    }
}

/// Accept links in order unless the target already reaches the source
///
/// Returns the cycle flag per link and the adjacency of accepted links.
fn break_cycles(n: usize, links: &[(usize, usize)]) -> (Vec<bool>, Vec<Vec<usize>>) {
    let mut accepted: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut cycle = Vec::with_capacity(links.len());
    let mut seen = vec![false; n];
    let mut stack = Vec::new();

    for &(u, v) in links {
        let closes = u == v || reaches(&accepted, v, u, &mut seen, &mut stack);
        if !closes {
            accepted[u].push(v);
        }
        cycle.push(closes);
    }
    (cycle, accepted)
}

/// Iterative DFS: is `to` reachable from `from`
fn reaches(
    adjacency: &[Vec<usize>],
    from: usize,
    to: usize,
    seen: &mut [bool],
    stack: &mut Vec<usize>,
) -> bool {
    seen.fill(false);
    stack.clear();
    seen[from] = true;
    stack.push(from);
    while let Some(u) = stack.pop() {
        if u == to {
            return true;
        }
        for &v in &adjacency[u] {
            if !seen[v] {
                seen[v] = true;
                stack.push(v);
            }
        }
    }
    false
}

/// Kahn's algorithm over an acyclic adjacency, ties in node order
fn topological_order(adjacency: &[Vec<usize>]) -> Vec<usize> {
    let mut indegree = vec![0usize; adjacency.len()];
    for targets in adjacency {
        for &v in targets {
            indegree[v] += 1;
        }
    }

    let mut ready: VecDeque<usize> = (0..adjacency.len()).filter(|&u| indegree[u] == 0).collect();
    let mut order = Vec::with_capacity(adjacency.len());
    while let Some(u) = ready.pop_front() {
        order.push(u);
        for &v in &adjacency[u] {
            indegree[v] -= 1;
            if indegree[v] == 0 {
                ready.push_back(v);
            }
        }
    }
    order
}
