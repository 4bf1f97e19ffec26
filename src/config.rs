// SPDX-License-Identifier: GPL-3.0-only

//! Persisted encoder settings

use crate::constants::MPEG_TIME_BASE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// User-facing encoder settings, persisted as JSON
///
/// Crop and scale are read once when a session starts; the time base may be
/// changed mid-session through the session API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderSettings {
    /// Presentation time base in ticks per second
    pub time_base: i64,
    /// Normalized crop ratios (left, top, right, bottom)
    pub crop: (f32, f32, f32, f32),
    /// Uniform scale applied after cropping
    pub scale_ratio: f32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            time_base: MPEG_TIME_BASE,
            crop: (0.0, 0.0, 1.0, 1.0),
            scale_ratio: 1.0,
        }
    }
}

impl EncoderSettings {
    /// Path of the settings file under the user config directory
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mediacap").join("encoder.json"))
    }

    /// Load settings, falling back to defaults when missing or unreadable
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Invalid settings file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist settings to the user config directory
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
    }
}
