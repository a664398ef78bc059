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

//! Concept history graph model
//!
//! The types carried by the event stream: citations ([`Source`]), historical
//! milestones ([`Node`]), influence links ([`Edge`]) and the cumulative
//! [`GraphState`] that a session grows one snapshot at a time.
//!
//! ## Wire Shape
//!
//! ```text
//! { "concept": "...",
//!   "nodes":   [ { id, time_period, year, region, key_contributors, main_idea_summary, sources } ],
//!   "edges":   [ { source_node_id, target_node_id, change_description, weight, sources } ],
//!   "metadata": { ... } }
//! ```
//!
//! Producers send partial snapshots, so every field except the identities
//! falls back to a default when absent or null.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Weight used when an edge arrives without a usable one
pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// Rendered stroke width bounds for edge emphasis
pub const MIN_STROKE_WIDTH: f64 = 1.0;
pub const MAX_STROKE_WIDTH: f64 = 5.0;

/// A citation backing a node or an edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub snippet: String,
    /// Free-form origin label (e.g. "google", "wikipedia")
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_type: String,
    /// Retrieval time exactly as the producer wrote it
    #[serde(default, deserialize_with = "null_as_default")]
    pub retrieved_at: String,
}

impl Source {
    /// Parse `retrieved_at` as RFC 3339 or as `YYYY-MM-DD HH:MM:SS[.ffffff]` (UTC).
    pub fn retrieved_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.retrieved_at.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

/// A historical milestone in the evolution of a concept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within a graph
    pub id: String,
    /// Display label, e.g. "4th century BCE"
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_period: String,
    /// Used for chronological ordering when present
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_contributors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub main_idea_summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<Source>,
}

impl Node {
    /// Create a node with only an id and a time label
    pub fn new(id: impl Into<String>, time_period: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            time_period: time_period.into(),
            ..Default::default()
        }
    }

    pub fn with_year(mut self, year: i64) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.main_idea_summary = summary.into();
        self
    }

    pub fn with_contributors<I, S>(mut self, contributors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_contributors = contributors.into_iter().map(Into::into).collect();
        self
    }
}

/// Identity of an edge: the directed (source, target) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// A causal or influence link between two milestones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub change_description: String,
    /// Visual emphasis only; always finite and positive
    #[serde(default = "default_weight", deserialize_with = "lenient_weight")]
    pub weight: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<Source>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            change_description: String::new(),
            weight: DEFAULT_EDGE_WEIGHT,
            sources: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.change_description = description.into();
        self
    }

    /// Set the weight, falling back to the default for unusable values
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = sanitize_weight(weight);
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source_node_id.clone(), self.target_node_id.clone())
    }

    pub fn is_self_loop(&self) -> bool {
        self.source_node_id == self.target_node_id
    }

    /// Weight clamped to the renderable stroke range
    pub fn stroke_width(&self) -> f64 {
        self.weight.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH)
    }

    pub(crate) fn has_key(&self, source: &str, target: &str) -> bool {
        self.source_node_id == source && self.target_node_id == target
    }
}

/// Cumulative concept graph
///
/// Nodes are keyed by id; the first-seen order of ids is tracked separately
/// so layout and rendering stay stable across updates. Edges keep their
/// first-seen order. Edges whose endpoints are not known yet wait in
/// `pending_edges`, which is never part of the wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GraphSnapshot", into = "GraphSnapshot")]
pub struct GraphState {
    /// The concept the session researches
    pub concept: String,
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) node_order: Vec<String>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) pending_edges: Vec<Edge>,
    /// Auxiliary key/value pairs, last write wins per key
    pub metadata: HashMap<String, serde_json::Value>,
}

impl GraphState {
    /// Create an empty graph for a concept
    pub fn new(concept: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            ..Default::default()
        }
    }

    /// Build a snapshot from loose parts
    ///
    /// Repeated node ids keep the later fields at the first position;
    /// repeated edge identities do the same. Edges are not checked against
    /// the nodes: a snapshot may reference nodes it does not carry.
    pub fn from_parts(
        concept: impl Into<String>,
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Self {
        let mut graph = Self::new(concept);
        for node in nodes {
            graph.upsert_node(node);
        }
        for edge in edges {
            graph.upsert_edge(edge);
        }
        graph
    }

    /// Parse a complete graph document in the wire shape
    pub fn from_json(raw: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// True when the graph carries no nodes and no edges
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Node ids in first-seen order
    pub fn node_ids(&self) -> &[String] {
        &self.node_order
    }

    /// Nodes in first-seen order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Accepted edges in first-seen order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.has_key(source, target))
    }

    /// Edges held back until both endpoints are known
    pub fn pending_edges(&self) -> &[Edge] {
        &self.pending_edges
    }

    /// Nodes by `year`; unknown years sort last, ties keep first-seen order
    pub fn chronological(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes().collect();
        // sort_by_key is stable, so equal years keep first-seen order
        nodes.sort_by_key(|n| (n.year.is_none(), n.year));
        nodes
    }

    /// Insert or replace a node wholesale, keeping its first-seen slot
    pub(crate) fn upsert_node(&mut self, node: Node) {
        if !self.nodes.contains_key(&node.id) {
            self.node_order.push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert or replace an accepted edge in place by identity
    pub(crate) fn upsert_edge(&mut self, edge: Edge) {
        upsert_by_key(&mut self.edges, edge);
    }
}

/// Replace the edge with the same identity in place, or append
pub(crate) fn upsert_by_key(edges: &mut Vec<Edge>, edge: Edge) {
    match edges
        .iter_mut()
        .find(|e| e.has_key(&edge.source_node_id, &edge.target_node_id))
    {
        Some(slot) => *slot = edge,
        None => edges.push(edge),
    }
}

/// Wire form of a graph snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub concept: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<Node>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub edges: Vec<Edge>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl From<GraphSnapshot> for GraphState {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut graph = GraphState::from_parts(snapshot.concept, snapshot.nodes, snapshot.edges);
        graph.metadata = snapshot.metadata;
        graph
    }
}

impl From<GraphState> for GraphSnapshot {
    fn from(mut graph: GraphState) -> Self {
        let nodes = graph
            .node_order
            .iter()
            .filter_map(|id| graph.nodes.remove(id))
            .collect();
        Self {
            concept: graph.concept,
            nodes,
            edges: graph.edges,
            metadata: graph.metadata,
        }
    }
}

fn default_weight() -> f64 {
    DEFAULT_EDGE_WEIGHT
}

fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        DEFAULT_EDGE_WEIGHT
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_weight<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let weight = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(DEFAULT_EDGE_WEIGHT),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_EDGE_WEIGHT),
        _ => DEFAULT_EDGE_WEIGHT,
    };
    Ok(sanitize_weight(weight))
}

fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
