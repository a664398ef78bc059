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

//! Error types
//!
//! Decode faults are recoverable per line and never abort a stream; session
//! and configuration errors are surfaced to the caller.

use thiserror::Error;

/// Why a single stream line was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFaultKind {
    /// The line was not valid UTF-8
    InvalidUtf8,
    /// The record after `data: ` was not valid JSON
    InvalidJson,
    /// The `type` discriminator named no known event
    UnknownType,
    /// The `data` payload did not fit its event type
    InvalidPayload,
    /// The line exceeded the configured length limit
    LineTooLong,
}

/// A single stream line that failed to decode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind:?}: {message}")]
pub struct DecodeFault {
    /// 1-based line number within the stream
    pub line: u64,
    pub kind: DecodeFaultKind,
    pub message: String,
}

impl DecodeFault {
    pub fn new(line: u64, kind: DecodeFaultKind, message: impl Into<String>) -> Self {
        Self {
            line,
            kind,
            message: message.into(),
        }
    }
}

/// Session-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session already reached `complete` or `error`
    #[error("session {session_id} is closed")]
    Closed { session_id: String },

    /// A newer session superseded this one
    #[error("session {session_id} was cancelled")]
    Cancelled { session_id: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum IdeagraphError {
    #[error("decode fault: {0}")]
    Decode(#[from] DecodeFault),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IdeagraphError>;
