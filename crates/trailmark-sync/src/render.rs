//! What the renderer needs to draw, detached from the store.

use crate::config::DisplayMode;
use trailmark_model::{Path, PathId, Point};

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPath {
    pub id: PathId,
    pub points: Vec<Point>,
    /// Resolved ARGB color
    pub color: u32,
    pub mode: DisplayMode,
}

impl RenderPath {
    pub fn from_path(path: &Path, mode: DisplayMode) -> Self {
        Self {
            id: path.id(),
            points: path.points().to_vec(),
            color: path.color(),
            mode,
        }
    }
}

/// Committed visible paths plus the recording in progress, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderView {
    pub paths: Vec<RenderPath>,
    pub live: Option<RenderPath>,
}

impl RenderView {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.live.is_none()
    }
}
