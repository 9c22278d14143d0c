//! Recording sessions
//!
//! ```text
//!            start                      finish(save) / cancel
//!   Idle ─────────────► Recording ─────────────────────────────► Stopped
//!                        │     ▲                                 ├─ Saved(path)      (>= 2 points)
//!                 sample │     │ appended / ignored / decimated  └─ Discarded(reason)
//!                        └─────┘
//! ```
//!
//! A session turns a stream of positions into a bounded point sequence. A
//! sample is captured only once it has moved at least `min_distance_sq` from
//! the last captured point. When capturing would exceed `max_points` the
//! configured [`OverflowPolicy`] decides between thinning the points and
//! asking the owner to stop.
//!
//! The client drives one session directly. The server keeps one per actor in
//! a [`ServerRecorder`] and samples them all from its tick loop.

use crate::config::{OverflowPolicy, RecordingConfig};
use crate::error::RecordingError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use trailmark_model::{decimate, ActorId, Path, PathId, Point};

/// Who samples positions for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureAuthority {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Too close to the last captured point
    Ignored,
    /// Sample from a dimension other than the session's
    WrongDimension,
    Appended,
    /// Points were thinned before the sample was appended
    Decimated { before: usize, after: usize },
    /// The sample did not fit; the owner should stop and save
    LimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Fewer than two points were captured
    TooShort,
    Cancelled,
    Disconnected,
}

#[derive(Debug, Clone)]
pub enum StopOutcome {
    Saved(Path),
    Discarded(DiscardReason),
}

impl StopOutcome {
    pub fn saved(&self) -> Option<&Path> {
        match self {
            StopOutcome::Saved(path) => Some(path),
            StopOutcome::Discarded(_) => None,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordingSession {
    path: Path,
    last: Point,
    authority: CaptureAuthority,
    config: RecordingConfig,
}

impl RecordingSession {
    /// Open a session seeded with `position`.
    pub fn start(
        owner_id: ActorId,
        owner_name: &str,
        name: Option<&str>,
        position: Point,
        dimension: &str,
        authority: CaptureAuthority,
        mut config: RecordingConfig,
    ) -> Self {
        // A stored path needs two points; decimating before an append needs
        // room for the start point, one kept point and the new sample.
        let floor = match config.overflow {
            OverflowPolicy::Decimate => 3,
            OverflowPolicy::StopAndSave => 2,
        };
        config.max_points = config.max_points.max(floor);
        let mut path = Path::new(name, owner_id, owner_name, dimension);
        path.push_point(position);
        tracing::debug!(
            path_id = %path.id(),
            owner = %owner_id,
            authority = ?authority,
            "recording started"
        );
        Self {
            path,
            last: position,
            authority,
            config,
        }
    }

    pub fn id(&self) -> PathId {
        self.path.id()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn authority(&self) -> CaptureAuthority {
        self.authority
    }

    pub fn last_captured(&self) -> Point {
        self.last
    }

    pub fn point_count(&self) -> usize {
        self.path.point_count()
    }

    pub fn sample(&mut self, position: Point, dimension: &str) -> SampleOutcome {
        if dimension != self.path.dimension() {
            return SampleOutcome::WrongDimension;
        }
        if self.last.distance_squared(&position) < self.config.min_distance_sq {
            return SampleOutcome::Ignored;
        }

        let count = self.path.point_count();
        if count < self.config.max_points {
            self.capture(position);
            return SampleOutcome::Appended;
        }

        match self.config.overflow {
            OverflowPolicy::StopAndSave => SampleOutcome::LimitReached,
            OverflowPolicy::Decimate => {
                let thinned = decimate(self.path.points(), self.config.max_points - 1);
                self.path.set_points(thinned);
                self.capture(position);
                let after = self.path.point_count();
                tracing::debug!(
                    path_id = %self.path.id(),
                    before = count,
                    after,
                    "decimated recording"
                );
                SampleOutcome::Decimated {
                    before: count,
                    after,
                }
            }
        }
    }

    /// End the session. Saving keeps the path only if it has at least two
    /// points.
    pub fn finish(self, save: bool) -> StopOutcome {
        if !save {
            return self.cancel(DiscardReason::Cancelled);
        }
        if self.path.point_count() < 2 {
            tracing::debug!(path_id = %self.path.id(), "recording too short, discarded");
            return StopOutcome::Discarded(DiscardReason::TooShort);
        }
        tracing::debug!(
            path_id = %self.path.id(),
            points = self.path.point_count(),
            "recording saved"
        );
        StopOutcome::Saved(self.path)
    }

    pub fn cancel(self, reason: DiscardReason) -> StopOutcome {
        tracing::debug!(path_id = %self.path.id(), reason = ?reason, "recording discarded");
        StopOutcome::Discarded(reason)
    }

    fn capture(&mut self, position: Point) {
        self.path.push_point(position);
        self.last = position;
    }
}

// ============================================================================
// Server recorder
// ============================================================================

/// Where an actor stood on the latest tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorPosition {
    pub actor: ActorId,
    pub position: Point,
    pub dimension: String,
}

/// Server-side sessions keyed by actor. Shared between the request handler
/// and the tick loop.
#[derive(Debug)]
pub struct ServerRecorder {
    sessions: DashMap<ActorId, RecordingSession>,
    config: RecordingConfig,
}

impl ServerRecorder {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn start(
        &self,
        actor: ActorId,
        actor_name: &str,
        name: Option<&str>,
        position: Option<&ActorPosition>,
    ) -> Result<PathId, RecordingError> {
        let position = position.ok_or(RecordingError::PositionUnknown)?;
        match self.sessions.entry(actor) {
            Entry::Occupied(_) => Err(RecordingError::AlreadyRecording),
            Entry::Vacant(slot) => {
                let session = RecordingSession::start(
                    actor,
                    actor_name,
                    name,
                    position.position,
                    &position.dimension,
                    CaptureAuthority::Server,
                    self.config.clone(),
                );
                let id = session.id();
                slot.insert(session);
                Ok(id)
            }
        }
    }

    pub fn stop(&self, actor: &ActorId, save: bool) -> Result<StopOutcome, RecordingError> {
        self.sessions
            .remove(actor)
            .map(|(_, session)| session.finish(save))
            .ok_or(RecordingError::NotRecording)
    }

    pub fn cancel(&self, actor: &ActorId) -> Option<StopOutcome> {
        self.sessions
            .remove(actor)
            .map(|(_, session)| session.cancel(DiscardReason::Cancelled))
    }

    /// Drop whatever `actor` was recording; their connection is gone.
    pub fn disconnect(&self, actor: &ActorId) -> Option<StopOutcome> {
        self.sessions
            .remove(actor)
            .map(|(_, session)| session.cancel(DiscardReason::Disconnected))
    }

    /// Sample every recording actor. Sessions that hit the point limit are
    /// stopped and saved; their outcomes are returned.
    pub fn tick(&self, positions: &[ActorPosition]) -> Vec<(ActorId, StopOutcome)> {
        let mut full = Vec::new();
        for sample in positions {
            if let Some(mut session) = self.sessions.get_mut(&sample.actor) {
                if session.sample(sample.position, &sample.dimension) == SampleOutcome::LimitReached
                {
                    full.push(sample.actor);
                }
            }
        }

        full.into_iter()
            .filter_map(|actor| {
                let (_, session) = self.sessions.remove(&actor)?;
                tracing::info!(
                    actor = %actor,
                    path_id = %session.id(),
                    "recording hit point limit"
                );
                Some((actor, session.finish(true)))
            })
            .collect()
    }

    pub fn is_recording(&self, actor: &ActorId) -> bool {
        self.sessions.contains_key(actor)
    }

    /// Snapshot of the path an actor is currently recording.
    pub fn live_path(&self, actor: &ActorId) -> Option<Path> {
        self.sessions.get(actor).map(|session| session.path().clone())
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
