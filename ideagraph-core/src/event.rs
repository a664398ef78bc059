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

//! Streamed research events
//!
//! One event per `data: ` line. Each record carries a `type` tag, a
//! tag-specific `data` payload and an optional `graph` snapshot:
//!
//! ```text
//! {"type": "graph_updated", "data": {"nodes": 2, "edges": 1}, "graph": {...}}
//! ```

use crate::error::{DecodeFault, DecodeFaultKind};
use crate::model::GraphState;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Tag-specific part of an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Start,
    Query { query: String },
    SourcesFound { count: u64 },
    /// Informational counts; the snapshot itself travels in `Event::graph`
    GraphUpdated { nodes: u64, edges: u64 },
    Complete,
    Error { message: String },
}

impl EventKind {
    /// The wire `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Query { .. } => "query",
            EventKind::SourcesFound { .. } => "sources_found",
            EventKind::GraphUpdated { .. } => "graph_updated",
            EventKind::Complete => "complete",
            EventKind::Error { .. } => "error",
        }
    }

    /// `complete` and `error` end a session
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Complete | EventKind::Error { .. })
    }

    fn payload(&self) -> Value {
        match self {
            EventKind::Start | EventKind::Complete => Value::Null,
            EventKind::Query { query } => json!({ "query": query }),
            EventKind::SourcesFound { count } => json!({ "count": count }),
            EventKind::GraphUpdated { nodes, edges } => json!({ "nodes": nodes, "edges": edges }),
            EventKind::Error { message } => json!({ "message": message }),
        }
    }
}

/// A decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Full or partial snapshot, allowed on every event type
    pub graph: Option<GraphState>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, graph: None }
    }

    pub fn with_graph(mut self, graph: GraphState) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Decode the JSON record that follows the `data: ` prefix
    pub fn parse_record(record: &str, line: u64) -> Result<Self, DecodeFault> {
        let raw: RawRecord = serde_json::from_str(record)
            .map_err(|e| DecodeFault::new(line, DecodeFaultKind::InvalidJson, e.to_string()))?;

        let invalid =
            |e: serde_json::Error| DecodeFault::new(line, DecodeFaultKind::InvalidPayload, e.to_string());

        let graph_value = match raw.graph {
            Some(Value::Null) | None => raw.data.get("graph").cloned().filter(|g| !g.is_null()),
            Some(graph) => Some(graph),
        };
        let graph = graph_value
            .map(serde_json::from_value::<GraphState>)
            .transpose()
            .map_err(invalid)?;

        let kind = match raw.kind.as_str() {
            "start" => EventKind::Start,
            "complete" => EventKind::Complete,
            "query" => {
                let query = match raw.data {
                    Value::String(query) => query,
                    data => payload::<QueryPayload>(data).map_err(invalid)?.query,
                };
                EventKind::Query { query }
            }
            "sources_found" => {
                let count = match raw.data {
                    Value::Number(ref n) if n.is_u64() => n.as_u64().unwrap_or_default(),
                    data => payload::<SourcesPayload>(data).map_err(invalid)?.count,
                };
                EventKind::SourcesFound { count }
            }
            "graph_updated" => {
                let counts = payload::<GraphCountsPayload>(raw.data).map_err(invalid)?;
                EventKind::GraphUpdated {
                    nodes: counts.nodes,
                    edges: counts.edges,
                }
            }
            "error" => {
                let message = match raw.data {
                    Value::String(message) => message,
                    data => payload::<ErrorPayload>(data).map_err(invalid)?.message,
                };
                EventKind::Error { message }
            }
            other => {
                return Err(DecodeFault::new(
                    line,
                    DecodeFaultKind::UnknownType,
                    format!("unknown event type '{}'", other),
                ))
            }
        };

        Ok(Self { kind, graph })
    }

    /// Encode as a JSON record (without the `data: ` prefix)
    pub fn to_record(&self) -> Value {
        let mut record = json!({
            "type": self.kind.type_name(),
            "data": self.kind.payload(),
        });
        if let Some(graph) = &self.graph {
            record["graph"] = serde_json::to_value(graph).unwrap_or(Value::Null);
        }
        record
    }

    /// Encode as one framed stream line, newline included
    pub fn to_line(&self) -> String {
        format!("data: {}\n", self.to_record())
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    graph: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryPayload {
    query: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SourcesPayload {
    count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GraphCountsPayload {
    nodes: u64,
    edges: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default = "unknown_error")]
    message: String,
}

impl Default for ErrorPayload {
    fn default() -> Self {
        Self {
            message: unknown_error(),
        }
    }
}

fn unknown_error() -> String {
    "unknown error".to_string()
}

/// Null payloads decode to the payload's default
fn payload<T: DeserializeOwned + Default>(data: Value) -> Result<T, serde_json::Error> {
    if data.is_null() {
        Ok(T::default())
    } else {
        serde_json::from_value(data)
    }
}
