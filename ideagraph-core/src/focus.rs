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

//! Detail overlay focus state
//!
//! Each node is either collapsed or expanded. Hover-enter expands at once;
//! hover-leave schedules a collapse after a grace period so the pointer can
//! travel from the node to its detail overlay. Entering again before the
//! period ends cancels the pending collapse. Several nodes may be expanded
//! at the same time.

use crate::config::FocusConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    Collapsed,
    Expanded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusIntent {
    /// Pointer entered the node or its overlay
    Enter,
    /// Pointer left; only schedules a collapse
    Leave,
    /// The grace period ran out without a new enter
    GraceElapsed,
}

impl FocusState {
    pub fn transition(self, intent: FocusIntent) -> FocusState {
        use FocusIntent::*;
        use FocusState::*;

        match (self, intent) {
            (_, Enter) => Expanded,
            (Expanded, GraceElapsed) => Collapsed,
            (state, Leave) => state,
            (Collapsed, GraceElapsed) => Collapsed,
        }
    }
}

/// A node changed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusChange {
    pub node_id: String,
    pub state: FocusState,
}

#[derive(Debug, Default)]
struct FocusEntry {
    state: FocusState,
    pending_collapse: Option<CancellationToken>,
}

struct Shared {
    entries: Mutex<HashMap<String, FocusEntry>>,
    grace: Duration,
    changes: broadcast::Sender<FocusChange>,
}

impl Shared {
    fn emit(&self, node_id: &str, state: FocusState) {
        // No subscribers is fine
        let _ = self.changes.send(FocusChange {
            node_id: node_id.to_string(),
            state,
        });
    }

    fn collapse_if_current(&self, node_id: &str, token: &CancellationToken) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(node_id) else {
            return;
        };
        // Cancellation happens under this lock, so an uncancelled token is
        // still the entry's pending collapse.
        if token.is_cancelled() {
            return;
        }
        entry.pending_collapse = None;
        let before = entry.state;
        entry.state = before.transition(FocusIntent::GraceElapsed);
        drop(entries);

        if before == FocusState::Expanded {
            debug!(node_id, "collapsed after grace period");
            self.emit(node_id, FocusState::Collapsed);
        }
    }
}

/// Per-node expand/collapse tracking with delayed collapse
///
/// Cheap to clone; clones share state. `leave` spawns its timer on the
/// current tokio runtime when there is one.
#[derive(Clone)]
pub struct FocusController {
    shared: Arc<Shared>,
}

impl FocusController {
    pub fn new(config: FocusConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                grace: config.collapse_grace(),
                changes,
            }),
        }
    }

    /// Expand a node, cancelling any pending collapse
    pub fn enter(&self, node_id: &str) {
        let mut entries = self.shared.entries.lock();
        let entry = entries.entry(node_id.to_string()).or_default();
        if let Some(token) = entry.pending_collapse.take() {
            token.cancel();
        }
        let before = entry.state;
        entry.state = before.transition(FocusIntent::Enter);
        drop(entries);

        if before != FocusState::Expanded {
            self.shared.emit(node_id, FocusState::Expanded);
        }
    }

    /// Schedule a collapse after the grace period
    ///
    /// Outside a tokio runtime there is no timer to wait on, so the node
    /// collapses at once.
    pub fn leave(&self, node_id: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(node_id, "no tokio runtime for the collapse timer, collapsing now");
            self.collapse_now(node_id);
            return;
        };

        let mut entries = self.shared.entries.lock();
        let Some(entry) = entries.get_mut(node_id) else {
            return;
        };
        if entry.state != FocusState::Expanded {
            return;
        }
        if let Some(previous) = entry.pending_collapse.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        entry.pending_collapse = Some(token.clone());
        drop(entries);

        let shared = Arc::clone(&self.shared);
        let node_id = node_id.to_string();
        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(shared.grace) => {
                    shared.collapse_if_current(&node_id, &token);
                }
            }
        });
    }

    fn collapse_now(&self, node_id: &str) {
        let mut entries = self.shared.entries.lock();
        let Some(entry) = entries.get_mut(node_id) else {
            return;
        };
        if let Some(token) = entry.pending_collapse.take() {
            token.cancel();
        }
        let before = entry.state;
        entry.state = before.transition(FocusIntent::GraceElapsed);
        drop(entries);

        if before == FocusState::Expanded {
            self.shared.emit(node_id, FocusState::Collapsed);
        }
    }

    pub fn state(&self, node_id: &str) -> FocusState {
        self.shared
            .entries
            .lock()
            .get(node_id)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    /// Ids of all expanded nodes, sorted
    pub fn expanded(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .shared
            .entries
            .lock()
            .iter()
            .filter(|(_, e)| e.state == FocusState::Expanded)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Collapse everything now and cancel all pending timers
    pub fn clear(&self) {
        let drained: Vec<(String, FocusEntry)> = self.shared.entries.lock().drain().collect();
        for (node_id, entry) in drained {
            if let Some(token) = entry.pending_collapse {
                token.cancel();
            }
            if entry.state == FocusState::Expanded {
                self.shared.emit(&node_id, FocusState::Collapsed);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FocusChange> {
        self.shared.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn controller() -> FocusController {
        FocusController::new(FocusConfig {
            collapse_grace_ms: 150,
        })
    }

    #[test]
    fn test_transitions() {
        use FocusIntent::*;
        use FocusState::*;

        assert_eq!(Collapsed.transition(Enter), Expanded);
        assert_eq!(Expanded.transition(Leave), Expanded);
        assert_eq!(Expanded.transition(GraceElapsed), Collapsed);
        assert_eq!(Collapsed.transition(GraceElapsed), Collapsed);
        assert_eq!(Expanded.transition(Enter), Expanded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_collapses_after_grace() {
        let focus = controller();
        focus.enter("athens");
        assert_eq!(focus.state("athens"), FocusState::Expanded);

        focus.leave("athens");
        sleep(Duration::from_millis(100)).await;
        assert_eq!(focus.state("athens"), FocusState::Expanded);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(focus.state("athens"), FocusState::Collapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reenter_cancels_pending_collapse() {
        let focus = controller();
        focus.enter("rome");
        focus.leave("rome");
        sleep(Duration::from_millis(100)).await;

        focus.enter("rome");
        sleep(Duration::from_millis(300)).await;
        assert_eq!(focus.state("rome"), FocusState::Expanded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_leave_restarts_grace() {
        let focus = controller();
        focus.enter("paris");
        focus.leave("paris");
        sleep(Duration::from_millis(100)).await;
        focus.leave("paris");

        sleep(Duration::from_millis(100)).await;
        assert_eq!(focus.state("paris"), FocusState::Expanded);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(focus.state("paris"), FocusState::Collapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_nodes_expand_independently() {
        let focus = controller();
        focus.enter("a");
        focus.enter("b");
        assert_eq!(focus.expanded(), vec!["a".to_string(), "b".to_string()]);

        focus.leave("a");
        sleep(Duration::from_millis(200)).await;
        assert_eq!(focus.expanded(), vec!["b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_are_broadcast() {
        let focus = controller();
        let mut changes = focus.subscribe();

        focus.enter("n");
        focus.enter("n");
        focus.leave("n");
        sleep(Duration::from_millis(200)).await;

        let first = changes.recv().await.unwrap();
        assert_eq!(first.state, FocusState::Expanded);
        let second = changes.recv().await.unwrap();
        assert_eq!(second.state, FocusState::Collapsed);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_timers() {
        let focus = controller();
        focus.enter("x");
        focus.leave("x");
        focus.clear();
        assert!(focus.expanded().is_empty());

        focus.enter("x");
        sleep(Duration::from_millis(300)).await;
        assert_eq!(focus.state("x"), FocusState::Expanded);
    }

    #[test]
    fn test_leave_unknown_node_is_ignored() {
        let focus = controller();
        focus.leave("never-seen");
        assert_eq!(focus.state("never-seen"), FocusState::Collapsed);
    }

    #[test]
    fn test_leave_without_runtime_collapses_at_once() {
        let focus = controller();
        let mut changes = focus.subscribe();

        focus.enter("a");
        focus.leave("a");

        assert_eq!(focus.state("a"), FocusState::Collapsed);
        assert!(focus.expanded().is_empty());
        assert_eq!(changes.try_recv().unwrap().state, FocusState::Expanded);
        assert_eq!(changes.try_recv().unwrap().state, FocusState::Collapsed);
    }
}
