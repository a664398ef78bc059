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

//! Streaming session driver
//!
//! A session is one research request, from `start` to `complete` or
//! `error`. [`GraphSession`] folds decoded events into its own
//! [`Reconciler`], re-runs the layout whenever the graph changes and
//! publishes a [`SessionView`] to every observer.
//!
//! [`ConceptExplorer`] hands out sessions. Beginning a new one cancels the
//! previous session, so events still buffered for an old concept are never
//! merged into the new graph.

use crate::config::{DecoderConfig, ViewerConfig};
use crate::decoder::decode_stream;
use crate::error::{DecodeFault, SessionError};
use crate::event::{Event, EventKind};
use crate::layout::{LayoutEngine, PositionedGraph};
use crate::model::GraphState;
use crate::reconcile::Reconciler;
use futures::stream::{Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a session stands, derived from the last event received
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Started,
    Searching { query: String },
    SourcesFound { count: u64 },
    Building { nodes: u64, edges: u64 },
    Completed,
    Failed { message: String },
}

#[derive(Debug, Error)]
#[error("Invalid transition: {current:?} -> {event}")]
pub struct InvalidTransition {
    pub current: SessionPhase,
    pub event: &'static str,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed { .. })
    }

    /// Next phase for an event
    ///
    /// Progress events may arrive in any order; each one moves the session
    /// to its own phase. Nothing leaves a terminal phase.
    pub fn transition(&self, event: &EventKind) -> Result<SessionPhase, InvalidTransition> {
        if self.is_terminal() {
            return Err(InvalidTransition {
                current: self.clone(),
                event: event.type_name(),
            });
        }

        let next = match event {
            EventKind::Start => SessionPhase::Started,
            EventKind::Query { query } => SessionPhase::Searching {
                query: query.clone(),
            },
            EventKind::SourcesFound { count } => SessionPhase::SourcesFound { count: *count },
            EventKind::GraphUpdated { nodes, edges } => SessionPhase::Building {
                nodes: *nodes,
                edges: *edges,
            },
            EventKind::Complete => SessionPhase::Completed,
            EventKind::Error { message } => SessionPhase::Failed {
                message: message.clone(),
            },
        };
        Ok(next)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::Started => write!(f, "Starting research"),
            SessionPhase::Searching { query } => write!(f, "Searching: {}", query),
            SessionPhase::SourcesFound { count } => write!(f, "Found {} sources", count),
            SessionPhase::Building { nodes, edges } => {
                write!(f, "Building graph: {} nodes, {} edges", nodes, edges)
            }
            SessionPhase::Completed => write!(f, "Complete"),
            SessionPhase::Failed { message } => write!(f, "Error: {}", message),
        }
    }
}

/// What observers see after every change
#[derive(Debug, Clone)]
pub struct SessionView {
    /// Nil before the first session
    pub session_id: Uuid,
    pub concept: String,
    pub phase: SessionPhase,
    /// Human-readable form of `phase`
    pub status: String,
    pub graph: Arc<GraphState>,
    pub layout: Arc<PositionedGraph>,
    /// Message of a terminal `error` event; shown alongside the graph
    pub error: Option<String>,
    pub decode_faults: u64,
}

impl SessionView {
    fn idle() -> Self {
        Self {
            session_id: Uuid::nil(),
            concept: String::new(),
            phase: SessionPhase::Idle,
            status: SessionPhase::Idle.to_string(),
            graph: Arc::new(GraphState::default()),
            layout: Arc::new(PositionedGraph::default()),
            error: None,
            decode_faults: 0,
        }
    }
}

/// How `GraphSession::run` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Failed(String),
    /// The stream ended (or broke) before a terminal event
    Ended,
    /// A newer session superseded this one
    Cancelled,
}

/// Hands out sessions and owns the observe channel
pub struct ConceptExplorer {
    config: ViewerConfig,
    views: Arc<watch::Sender<SessionView>>,
    active: Option<CancellationToken>,
}

impl ConceptExplorer {
    pub fn new(config: ViewerConfig) -> Self {
        let (views, _) = watch::channel(SessionView::idle());
        Self {
            config,
            views: Arc::new(views),
            active: None,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Receive the current view now and every later one
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.views.subscribe()
    }

    /// Latest published view
    pub fn current(&self) -> SessionView {
        self.views.borrow().clone()
    }

    /// Start a session for a new concept, cancelling the previous one
    pub fn begin(&mut self, concept: impl Into<String>) -> GraphSession {
        self.cancel();
        let token = CancellationToken::new();
        self.active = Some(token.clone());
        GraphSession::new(concept.into(), &self.config, Arc::clone(&self.views), token)
    }

    /// Cancel the running session, if any
    pub fn cancel(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.cancel();
        }
    }
}

/// One streamed research request
pub struct GraphSession {
    id: Uuid,
    concept: String,
    reconciler: Reconciler,
    engine: LayoutEngine,
    layout: Arc<PositionedGraph>,
    phase: SessionPhase,
    error: Option<String>,
    decode_faults: u64,
    decoder_config: DecoderConfig,
    views: Arc<watch::Sender<SessionView>>,
    cancel: CancellationToken,
}

impl GraphSession {
    fn new(
        concept: String,
        config: &ViewerConfig,
        views: Arc<watch::Sender<SessionView>>,
        cancel: CancellationToken,
    ) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            reconciler: Reconciler::new(concept.clone()),
            concept,
            engine: LayoutEngine::new(config.layout.clone()),
            layout: Arc::new(PositionedGraph::default()),
            phase: SessionPhase::Idle,
            error: None,
            decode_faults: 0,
            decoder_config: config.decoder.clone(),
            views,
            cancel,
        };
        info!(session_id = %session.id, concept = %session.concept, "session started");
        session.publish();
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn graph(&self) -> Arc<GraphState> {
        self.reconciler.snapshot()
    }

    pub fn layout(&self) -> Arc<PositionedGraph> {
        Arc::clone(&self.layout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id,
            concept: self.concept.clone(),
            phase: self.phase.clone(),
            status: self.phase.to_string(),
            graph: self.reconciler.snapshot(),
            layout: Arc::clone(&self.layout),
            error: self.error.clone(),
            decode_faults: self.decode_faults,
        }
    }

    /// Apply one decoded event and publish the result
    pub fn apply(&mut self, event: Event) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled {
                session_id: self.id.to_string(),
            });
        }
        let next = self.phase.transition(&event.kind).map_err(|_| SessionError::Closed {
            session_id: self.id.to_string(),
        })?;

        if let Some(graph) = &event.graph {
            if self.reconciler.apply(graph) {
                self.layout = Arc::new(self.engine.layout(self.reconciler.state()));
            }
        }

        if let SessionPhase::Failed { message } = &next {
            warn!(session_id = %self.id, "session failed: {}", message);
            self.error = Some(message.clone());
        }
        if next.is_terminal() {
            self.reconciler.finish();
            let graph = self.reconciler.state();
            info!(
                session_id = %self.id,
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                "session closed"
            );
        }

        debug!(session_id = %self.id, phase = %next, "applied event");
        self.phase = next;
        self.publish();
        Ok(())
    }

    /// Count a dropped line and publish the new total
    pub fn record_fault(&mut self, fault: &DecodeFault) {
        self.decode_faults += 1;
        debug!(session_id = %self.id, line = fault.line, "decode fault recorded");
        self.publish();
    }

    /// Drive a transport stream until a terminal event, end of stream or
    /// cancellation
    pub async fn run<S, B, E>(mut self, chunks: S) -> SessionOutcome
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let events = decode_stream(chunks, self.decoder_config.clone());
        tokio::pin!(events);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                item = events.next() => Some(item),
            };

            match next {
                None => {
                    info!(session_id = %self.id, "session cancelled");
                    return SessionOutcome::Cancelled;
                }
                Some(None) => {
                    self.reconciler.finish();
                    self.publish();
                    info!(session_id = %self.id, phase = %self.phase, "stream ended before a terminal event");
                    return SessionOutcome::Ended;
                }
                Some(Some(Err(fault))) => self.record_fault(&fault),
                Some(Some(Ok(event))) => match self.apply(event) {
                    Ok(()) => match &self.phase {
                        SessionPhase::Completed => return SessionOutcome::Completed,
                        SessionPhase::Failed { message } => {
                            return SessionOutcome::Failed(message.clone())
                        }
                        _ => {}
                    },
                    Err(SessionError::Cancelled { .. }) => return SessionOutcome::Cancelled,
                    Err(SessionError::Closed { .. }) => return SessionOutcome::Ended,
                },
            }
        }
    }

    fn publish(&self) {
        let view = self.view();
        // Checked under the channel lock; `begin` cancels this token before
        // the next session publishes its first view.
        self.views.send_if_modified(|current| {
            if self.cancel.is_cancelled() {
                return false;
            }
            *current = view;
            true
        });
    }
}
