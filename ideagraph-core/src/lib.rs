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

//! Ideagraph Core
//!
//! Client-side engine for streamed concept-evolution graphs: decodes the
//! server's event stream, folds graph snapshots into one cumulative graph,
//! lays it out in layers and publishes each change to observers.

pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod focus;
pub mod layout;
pub mod model;
pub mod reconcile;
pub mod session;
pub mod summary;

pub use config::{DecoderConfig, FocusConfig, LayoutConfig, ViewerConfig};
pub use decoder::{decode_stream, Decoded, EventDecoder, DATA_PREFIX};
pub use error::{ConfigError, DecodeFault, DecodeFaultKind, IdeagraphError, Result, SessionError};
pub use event::{Event, EventKind};
pub use focus::{FocusChange, FocusController, FocusIntent, FocusState};
pub use layout::{Bounds, LayoutEngine, Position, PositionedGraph, PositionedNode};
pub use model::{Edge, EdgeKey, GraphSnapshot, GraphState, Node, Source};
pub use reconcile::{merge, Reconciler};
pub use session::{
    ConceptExplorer, GraphSession, InvalidTransition, SessionOutcome, SessionPhase, SessionView,
};
pub use summary::GraphStats;
