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

//! Viewer configuration
//!
//! Spacing constants for the layout, the focus grace period and decoder
//! limits. Every field has a default, so a TOML file only needs the keys it
//! changes:
//!
//! ```toml
//! [layout]
//! rank_spacing = 320.0
//!
//! [focus]
//! collapse_grace_ms = 200
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default distance between consecutive ranks (primary axis)
pub const DEFAULT_RANK_SPACING: f64 = 300.0;

/// Default distance between nodes sharing a rank (secondary axis)
pub const DEFAULT_NODE_SPACING: f64 = 200.0;

/// Default delay before a hovered node collapses
pub const DEFAULT_COLLAPSE_GRACE_MS: u64 = 150;

/// Default limit for a single stream line
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Layout spacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub rank_spacing: f64,
    pub node_spacing: f64,
    /// Coordinate of rank 0
    pub origin_x: f64,
    /// Coordinate of the first slot in every rank
    pub origin_y: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            rank_spacing: DEFAULT_RANK_SPACING,
            node_spacing: DEFAULT_NODE_SPACING,
            origin_x: 0.0,
            origin_y: 0.0,
        }
    }
}

/// Detail overlay behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub collapse_grace_ms: u64,
}

impl FocusConfig {
    pub fn collapse_grace(&self) -> Duration {
        Duration::from_millis(self.collapse_grace_ms)
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            collapse_grace_ms: DEFAULT_COLLAPSE_GRACE_MS,
        }
    }
}

/// Stream decoder limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Longest line kept in memory; longer lines are dropped as faults
    pub max_line_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// All tunables of the viewer core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub layout: LayoutConfig,
    pub focus: FocusConfig,
    pub decoder: DecoderConfig,
}

impl ViewerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("layout.rank_spacing", self.layout.rank_spacing)?;
        positive("layout.node_spacing", self.layout.node_spacing)?;
        finite("layout.origin_x", self.layout.origin_x)?;
        finite("layout.origin_y", self.layout.origin_y)?;
        if self.decoder.max_line_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "decoder.max_line_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} is not finite", value),
        })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} must be positive", value),
        })
    }
}
