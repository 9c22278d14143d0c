//! Authoritative server
//!
//! Holds every path any client has handed over, decides who may change what,
//! and numbers its replies per client so duplicates can be recognised:
//!
//! ```text
//!   ClientLink (per connected actor)
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ next_seq: 5   acked: 2   unacked: [seq 3, seq 4]         │
//!   └──────────────────────────────────────────────────────────┘
//!        Ack { seq: 3 }  ──►  acked: 3   unacked: [seq 4]
//! ```
//!
//! Authorization:
//!
//! | action          | owner | share recipient        | anyone else |
//! |-----------------|-------|------------------------|-------------|
//! | rename, recolor | yes   | no                     | no          |
//! | share           | yes   | no                     | no          |
//! | delete          | yes   | removes own access     | no          |
//!
//! Results carry the authoritative path even on failure, so a client's
//! optimistic shadow is corrected right away.

use crate::config::RecordingConfig;
use crate::error::ProtocolError;
use crate::protocol::{
    decode, encode, ActionKind, ActionRequest, ActionResult, Channel, ClientMessage,
    ServerMessage,
};
use crate::recording::{ActorPosition, ServerRecorder, StopOutcome};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use trailmark_model::{ActorId, Path, PathId, ValidationError, DEFAULT_PATH_NAME};
use trailmark_storage::{PathStorage, StorageError};

/// A message addressed to one client.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: ActorId,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn channel(&self) -> Channel {
        self.message.channel()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(&self.message)
    }
}

#[derive(Debug)]
struct ClientLink {
    name: String,
    next_seq: u64,
    acked: u64,
    unacked: VecDeque<ActionResult>,
}

impl ClientLink {
    fn new(name: String) -> Self {
        Self {
            name,
            next_seq: 1,
            acked: 0,
            unacked: VecDeque::new(),
        }
    }
}

struct Verdict {
    success: bool,
    message: String,
    path_id: Option<PathId>,
    path: Option<Path>,
}

impl Verdict {
    fn ok(message: impl Into<String>, path_id: Option<PathId>, path: Option<Path>) -> Self {
        Self {
            success: true,
            message: message.into(),
            path_id,
            path,
        }
    }

    fn fail(message: impl Into<String>, path_id: Option<PathId>, path: Option<Path>) -> Self {
        Self {
            success: false,
            message: message.into(),
            path_id,
            path,
        }
    }
}

pub struct PathServer {
    paths: RwLock<BTreeMap<PathId, Path>>,
    links: Mutex<HashMap<ActorId, ClientLink>>,
    positions: Mutex<HashMap<ActorId, ActorPosition>>,
    recorder: ServerRecorder,
    storage: Option<Arc<PathStorage>>,
}

impl PathServer {
    pub fn new(recording: RecordingConfig) -> Self {
        Self {
            paths: RwLock::new(BTreeMap::new()),
            links: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            recorder: ServerRecorder::new(recording),
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<PathStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Load persisted paths into memory.
    pub fn load(&self) -> Result<usize, StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(0);
        };
        let report = storage.load()?;
        let count = report.paths.len();
        let mut paths = self.paths.write();
        for path in report.paths {
            paths.insert(path.id(), path);
        }
        tracing::info!(loaded = count, skipped = report.skipped.len(), "server paths loaded");
        Ok(count)
    }

    pub fn path(&self, id: &PathId) -> Option<Path> {
        self.paths.read().get(id).cloned()
    }

    pub fn path_count(&self) -> usize {
        self.paths.read().len()
    }

    pub fn recorder(&self) -> &ServerRecorder {
        &self.recorder
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Register a client and return its initial snapshot. Reconnecting
    /// starts a fresh sequence.
    pub fn connect(&self, actor: ActorId, name: impl Into<String>) -> Outbound {
        self.links.lock().insert(actor, ClientLink::new(name.into()));
        tracing::info!(actor = %actor, "client connected");
        self.snapshot_message(actor)
    }

    /// Drop a client along with any recording it had open.
    pub fn disconnect(&self, actor: &ActorId) {
        if let Some(outcome) = self.recorder.disconnect(actor) {
            tracing::debug!(actor = %actor, outcome = ?outcome, "recording dropped");
        }
        self.positions.lock().remove(actor);
        if self.links.lock().remove(actor).is_some() {
            tracing::info!(actor = %actor, "client disconnected");
        }
    }

    pub fn is_connected(&self, actor: &ActorId) -> bool {
        self.links.lock().contains_key(actor)
    }

    pub fn update_position(&self, position: ActorPosition) {
        self.positions.lock().insert(position.actor, position);
    }

    /// Paths `actor` owns or has been shared, oldest first.
    pub fn snapshot_for(&self, actor: &ActorId) -> Vec<Path> {
        let mut out: Vec<Path> = self
            .paths
            .read()
            .values()
            .filter(|p| p.owner_id() == *actor || p.is_shared_with(actor))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(&b.id())));
        out
    }

    fn snapshot_message(&self, actor: ActorId) -> Outbound {
        Outbound {
            to: actor,
            message: ServerMessage::FullSync {
                paths: self.snapshot_for(&actor),
            },
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Decode and handle bytes `from` sent on `channel`. Undecodable input
    /// is dropped without a reply.
    pub fn handle_message(&self, from: ActorId, channel: Channel, bytes: &[u8]) -> Vec<Outbound> {
        match decode::<ClientMessage>(channel, bytes) {
            Ok(message) => self.apply_message(from, message),
            Err(err) => {
                tracing::warn!(
                    actor = %from,
                    channel = %channel,
                    error = %err,
                    "dropping undecodable message"
                );
                Vec::new()
            }
        }
    }

    pub fn apply_message(&self, from: ActorId, message: ClientMessage) -> Vec<Outbound> {
        match message {
            ClientMessage::Action(request) => self.handle_action(from, request),
            ClientMessage::Ack { seq } => {
                self.ack(&from, seq);
                Vec::new()
            }
            ClientMessage::RequestSync => {
                if !self.is_connected(&from) {
                    return Vec::new();
                }
                vec![self.snapshot_message(from)]
            }
        }
    }

    pub fn handle_action(&self, from: ActorId, request: ActionRequest) -> Vec<Outbound> {
        let Some(actor_name) = self.links.lock().get(&from).map(|link| link.name.clone()) else {
            tracing::warn!(actor = %from, "action from unknown client");
            return Vec::new();
        };
        let action = request.kind();
        let mut out = Vec::new();

        let verdict = match request {
            ActionRequest::Rename { path_id, name } => {
                self.edit(from, path_id, |path| path.set_name(&name).map(|_| "renamed"))
            }
            ActionRequest::Recolor { path_id, color } => {
                self.edit(from, path_id, |path| path.set_color(color).map(|_| "recolored"))
            }
            ActionRequest::Delete { path_id } => self.delete(from, path_id),
            ActionRequest::Share {
                path_id,
                target,
                upload,
            } => {
                let verdict = self.share(from, path_id, target, upload);
                if verdict.success && self.is_connected(&target) {
                    if let Some(path) = verdict.path.clone() {
                        out.push(Outbound {
                            to: target,
                            message: ServerMessage::Shared { path },
                        });
                    }
                }
                verdict
            }
            ActionRequest::StartRecording { name } => {
                let name = name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| self.default_name(&from));
                let position = self.positions.lock().get(&from).cloned();
                match self
                    .recorder
                    .start(from, &actor_name, Some(&name), position.as_ref())
                {
                    Ok(id) => Verdict::ok("recording started", Some(id), None),
                    Err(err) => Verdict::fail(err.to_string(), None, None),
                }
            }
            ActionRequest::StopRecording { save } => match self.recorder.stop(&from, save) {
                Ok(outcome) => self.commit_recording(outcome),
                Err(err) => Verdict::fail(err.to_string(), None, None),
            },
        };

        if !verdict.success {
            tracing::debug!(
                actor = %from,
                action = ?action,
                reason = %verdict.message,
                "action rejected"
            );
        }
        if let Some(result) = self.issue(from, action, verdict) {
            out.insert(0, result);
        }
        out
    }

    /// Sample every recording actor. Sessions that hit the point limit are
    /// saved and their owners told.
    pub fn tick(&self, positions: Vec<ActorPosition>) -> Vec<Outbound> {
        let stopped = self.recorder.tick(&positions);
        {
            let mut known = self.positions.lock();
            for position in positions {
                known.insert(position.actor, position);
            }
        }
        stopped
            .into_iter()
            .filter_map(|(actor, outcome)| {
                let mut verdict = self.commit_recording(outcome);
                verdict.message = "point limit reached, recording saved".to_string();
                self.issue(actor, ActionKind::StopRecording, verdict)
            })
            .collect()
    }

    // ========================================================================
    // Acknowledgements
    // ========================================================================

    /// Everything up to and including `seq` has been applied by `from`.
    pub fn ack(&self, from: &ActorId, seq: u64) {
        let mut links = self.links.lock();
        let Some(link) = links.get_mut(from) else {
            return;
        };
        if seq >= link.next_seq {
            tracing::warn!(actor = %from, seq, next = link.next_seq, "ack for unsent result");
            return;
        }
        link.acked = link.acked.max(seq);
        link.unacked.retain(|result| result.seq > seq);
    }

    /// Results `actor` has not acknowledged yet, oldest first.
    pub fn pending_retransmits(&self, actor: &ActorId) -> Vec<Outbound> {
        self.links
            .lock()
            .get(actor)
            .map(|link| {
                link.unacked
                    .iter()
                    .cloned()
                    .map(|result| Outbound {
                        to: *actor,
                        message: ServerMessage::Result(result),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn last_acked(&self, actor: &ActorId) -> Option<u64> {
        self.links.lock().get(actor).map(|link| link.acked)
    }

    fn issue(&self, to: ActorId, action: ActionKind, verdict: Verdict) -> Option<Outbound> {
        let mut links = self.links.lock();
        let link = links.get_mut(&to)?;
        let seq = link.next_seq;
        link.next_seq += 1;
        let result = ActionResult {
            action,
            path_id: verdict.path_id,
            success: verdict.success,
            message: verdict.message,
            path: verdict.path,
            seq,
            ack_seq: (link.acked > 0).then_some(link.acked),
        };
        link.unacked.push_back(result.clone());
        Some(Outbound {
            to,
            message: ServerMessage::Result(result),
        })
    }

    // ========================================================================
    // Actions
    // ========================================================================

    fn edit<F>(&self, from: ActorId, id: PathId, apply: F) -> Verdict
    where
        F: FnOnce(&mut Path) -> Result<&'static str, ValidationError>,
    {
        let verdict = {
            let mut paths = self.paths.write();
            let Some(path) = paths.get_mut(&id) else {
                return Verdict::fail("unknown path", Some(id), None);
            };
            if path.owner_id() != from {
                let current = Some(path.clone());
                return Verdict::fail("only the owner can change this path", Some(id), current);
            }
            match apply(path) {
                Ok(message) => Verdict::ok(message, Some(id), Some(path.clone())),
                Err(err) => return Verdict::fail(err.to_string(), Some(id), Some(path.clone())),
            }
        };
        self.persist(id);
        verdict
    }

    fn delete(&self, from: ActorId, id: PathId) -> Verdict {
        let mut paths = self.paths.write();
        let Some(owner) = paths.get(&id).map(Path::owner_id) else {
            return Verdict::fail("unknown path", Some(id), None);
        };

        if owner == from {
            paths.remove(&id);
            drop(paths);
            if let Some(storage) = &self.storage {
                if let Err(err) = storage.delete(&id) {
                    tracing::warn!(path_id = %id, error = %err, "failed to delete path file");
                }
            }
            return Verdict::ok("deleted", Some(id), None);
        }

        let unshared = paths
            .get_mut(&id)
            .map(|path| path.unshare(&from))
            .unwrap_or(false);
        drop(paths);
        if unshared {
            self.persist(id);
            return Verdict::ok("removed from shared paths", Some(id), None);
        }
        Verdict::fail("only the owner can delete this path", Some(id), None)
    }

    fn share(&self, from: ActorId, id: PathId, target: ActorId, upload: Option<Path>) -> Verdict {
        if target == from {
            return Verdict::fail("cannot share a path with yourself", Some(id), None);
        }
        let shared = {
            let mut paths = self.paths.write();
            if let Some(upload) = upload {
                if upload.id() != id || upload.owner_id() != from {
                    return Verdict::fail("upload does not match the request", Some(id), None);
                }
                match paths.get(&id).map(Path::owner_id) {
                    Some(owner) if owner != from => {
                        return Verdict::fail("path id already taken", Some(id), None);
                    }
                    Some(_) => {}
                    None => {
                        tracing::debug!(path_id = %id, owner = %from, "accepted uploaded path");
                        paths.insert(id, upload);
                    }
                }
            }
            let Some(path) = paths.get_mut(&id) else {
                return Verdict::fail("unknown path", Some(id), None);
            };
            if path.owner_id() != from {
                let current = Some(path.clone());
                return Verdict::fail("only the owner can share this path", Some(id), current);
            }
            path.share_with(target);
            path.clone()
        };
        self.persist(id);
        Verdict::ok("shared", Some(id), Some(shared))
    }

    fn default_name(&self, owner: &ActorId) -> String {
        let owned = self
            .paths
            .read()
            .values()
            .filter(|p| p.owner_id() == *owner)
            .count();
        format!("{} {}", DEFAULT_PATH_NAME, owned + 1)
    }

    fn commit_recording(&self, outcome: StopOutcome) -> Verdict {
        match outcome {
            StopOutcome::Saved(path) => {
                let id = path.id();
                self.paths.write().insert(id, path.clone());
                self.persist(id);
                Verdict::ok("recording saved", Some(id), Some(path))
            }
            StopOutcome::Discarded(reason) => {
                Verdict::ok(format!("recording discarded: {reason:?}"), None, None)
            }
        }
    }

    /// Write one path through. Must not be called with the path lock held.
    fn persist(&self, id: PathId) {
        let Some(storage) = &self.storage else {
            return;
        };
        storage.mark_dirty(id);
        let report = storage.save_dirty(|id| self.path(id));
        for (failed, error) in &report.failed {
            tracing::warn!(path_id = %failed, error = %error, "failed to persist path");
        }
    }
}
