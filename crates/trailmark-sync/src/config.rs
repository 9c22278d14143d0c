//! Runtime configuration
//!
//! Loaded from JSON; every top-level field is optional and falls back to
//! [`TrailConfig::default`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use trailmark_storage::StorageConfig;

/// What a recorder does when the next point would exceed `max_points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Thin the captured points and keep recording.
    Decimate,
    /// End the session and save what was captured.
    StopAndSave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Squared distance a sample must move before it is captured
    pub min_distance_sq: f64,
    pub max_points: usize,
    pub overflow: OverflowPolicy,
}

impl RecordingConfig {
    /// The client samples every frame, so it thins at ~0.2 blocks.
    pub fn client() -> Self {
        Self {
            min_distance_sq: 0.2 * 0.2,
            max_points: 5_000,
            overflow: OverflowPolicy::Decimate,
        }
    }

    /// The server samples once per tick, so it thins at ~2 blocks.
    pub fn server() -> Self {
        Self {
            min_distance_sq: 2.0 * 2.0,
            max_points: 5_000,
            overflow: OverflowPolicy::StopAndSave,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self::client()
    }
}

/// How the renderer draws committed paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Line,
    Dots,
    Arrows,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailConfig {
    pub client_recording: RecordingConfig,
    pub server_recording: RecordingConfig,
    pub display_mode: DisplayMode,
    pub storage: StorageConfig,
    /// Upper bound on name completions offered to the command layer
    pub suggestion_limit: usize,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            client_recording: RecordingConfig::client(),
            server_recording: RecordingConfig::server(),
            display_mode: DisplayMode::default(),
            storage: StorageConfig::default(),
            suggestion_limit: 10,
        }
    }
}

impl TrailConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &FsPath) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
