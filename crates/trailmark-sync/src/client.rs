//! Client orchestrator
//!
//! [`PathClient`] is the single owner of everything a client knows about
//! paths. It runs on the host's main thread; inbound bytes are handed to
//! [`PathClient::handle_message`] there.
//!
//! ```text
//!   local recording ──► PathStore (Local) ──► PathStorage (dirty set)
//!
//!   rename/recolor/delete/share ──► optimistic shadow ──► Transport ──► server
//!                                                                       │
//!   FullSync / Shared / Result ◄────────────────────────────────────────┘
//!        │
//!        └─► Reconciler ──► PathStore (ServerOwned / ServerShared)
//! ```
//!
//! Local paths are authoritative here. Server paths are shadows: edits to
//! them are applied optimistically and overwritten by whatever the server
//! says next.

use crate::config::{DisplayMode, TrailConfig};
use crate::error::{ClientError, RecordingError};
use crate::protocol::{
    decode, ActionKind, ActionRequest, ActionResult, Channel, ClientMessage, ServerMessage,
};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::recording::{
    CaptureAuthority, DiscardReason, RecordingSession, SampleOutcome, StopOutcome,
};
use crate::render::{RenderPath, RenderView};
use crate::store::{Origin, PathStore};
use crate::transport::{ConnectionContext, Transport};
use std::sync::Arc;
use trailmark_model::{
    find_by_name, parse_color, suggest_names, ActorId, Path, PathId, Point, ValidationError,
    DEFAULT_PATH_NAME,
};
use trailmark_storage::{PathStorage, SaveBatch, SaveReport, StorageError};

/// How a mutation took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied to a local path, which this client owns outright
    Applied,
    /// Sent to the server; the local shadow was updated optimistically
    Sent,
    /// The server could not be reached; only the local shadow changed
    LocalOnly,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Undecodable, or nothing to apply it to
    Dropped,
    /// An action result already applied
    Duplicate,
    Result { action: ActionKind, success: bool },
    Synced(ReconcileReport),
    Shared(PathId),
}

pub struct PathClient {
    actor: ActorId,
    actor_name: String,
    config: TrailConfig,
    store: PathStore,
    reconciler: Reconciler,
    recording: Option<RecordingSession>,
    remote_recording: bool,
    storage: Option<Arc<PathStorage>>,
    connection: Option<ConnectionContext>,
}

impl PathClient {
    pub fn new(actor: ActorId, actor_name: impl Into<String>, config: TrailConfig) -> Self {
        Self {
            actor,
            actor_name: actor_name.into(),
            config,
            store: PathStore::new(),
            reconciler: Reconciler::new(actor),
            recording: None,
            remote_recording: false,
            storage: None,
            connection: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<PathStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn store(&self) -> &PathStore {
        &self.store
    }

    pub fn config(&self) -> &TrailConfig {
        &self.config
    }

    pub fn storage(&self) -> Option<&Arc<PathStorage>> {
        self.storage.as_ref()
    }

    /// Load local paths from disk; each enters the store visible.
    pub fn load_local(&mut self) -> Result<usize, StorageError> {
        let Some(storage) = self.storage.as_ref() else {
            return Ok(0);
        };
        let report = storage.load()?;
        for (file, reason) in &report.skipped {
            tracing::warn!(
                path = %file.display(),
                reason = %reason,
                "skipped unreadable path file"
            );
        }
        let count = report.paths.len();
        for path in report.paths {
            let id = path.id();
            self.store.upsert(path, Origin::Local);
            self.store.set_visible(id);
        }
        tracing::info!(
            loaded = count,
            recovered = report.recovered.len(),
            "loaded local paths"
        );
        Ok(count)
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Install a fresh connection and ask for a full snapshot.
    pub fn connect(&mut self, transport: Box<dyn Transport>) {
        let context = ConnectionContext::new(self.actor, transport);
        if let Err(err) = context.send(&ClientMessage::RequestSync) {
            tracing::warn!(error = %err, "could not request initial sync");
        }
        self.connection = Some(context);
    }

    /// Forget the connection. Server paths stay as they were until the next
    /// sync replaces them.
    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            tracing::info!(actor = %self.actor, "disconnected");
        }
        self.remote_recording = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn request_sync(&self) -> Result<(), ClientError> {
        let connection = self.connection.as_ref().ok_or(ClientError::Offline)?;
        connection.send(&ClientMessage::RequestSync)?;
        Ok(())
    }

    // ========================================================================
    // Local recording
    // ========================================================================

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn recording(&self) -> Option<&RecordingSession> {
        self.recording.as_ref()
    }

    pub fn start_recording(
        &mut self,
        name: Option<&str>,
        position: Point,
        dimension: &str,
    ) -> Result<PathId, RecordingError> {
        if self.recording.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        let generated;
        let name = match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => {
                let owned = self.store.paths_owned_by(&self.actor).len();
                generated = format!("{} {}", DEFAULT_PATH_NAME, owned + 1);
                &generated
            }
        };
        let session = RecordingSession::start(
            self.actor,
            &self.actor_name,
            Some(name),
            position,
            dimension,
            CaptureAuthority::Client,
            self.config.client_recording.clone(),
        );
        let id = session.id();
        self.recording = Some(session);
        Ok(id)
    }

    /// Feed the current position to the open session. Hitting the point
    /// limit under the stop-and-save policy commits the path right away.
    pub fn sample(
        &mut self,
        position: Point,
        dimension: &str,
    ) -> Result<SampleOutcome, RecordingError> {
        let session = self.recording.as_mut().ok_or(RecordingError::NotRecording)?;
        let outcome = session.sample(position, dimension);
        if outcome == SampleOutcome::LimitReached {
            self.stop_recording(true)?;
        }
        Ok(outcome)
    }

    pub fn stop_recording(&mut self, save: bool) -> Result<StopOutcome, RecordingError> {
        let session = self.recording.take().ok_or(RecordingError::NotRecording)?;
        let outcome = session.finish(save);
        if let StopOutcome::Saved(path) = &outcome {
            self.commit_local(path.clone());
        }
        Ok(outcome)
    }

    pub fn cancel_recording(&mut self) -> Result<StopOutcome, RecordingError> {
        let session = self.recording.take().ok_or(RecordingError::NotRecording)?;
        Ok(session.cancel(DiscardReason::Cancelled))
    }

    fn commit_local(&mut self, path: Path) {
        let id = path.id();
        self.store.upsert(path, Origin::Local);
        self.store.set_visible(id);
        self.mark_dirty(id);
    }

    // ========================================================================
    // Remote recording
    // ========================================================================

    pub fn is_remote_recording(&self) -> bool {
        self.remote_recording
    }

    /// Ask the server to record this actor's movement.
    pub fn start_remote_recording(&mut self, name: Option<&str>) -> Result<(), ClientError> {
        if self.recording.is_some() {
            return Err(RecordingError::AlreadyRecording.into());
        }
        self.send_action(ActionRequest::StartRecording {
            name: name.map(str::to_string),
        })
    }

    pub fn stop_remote_recording(&mut self, save: bool) -> Result<(), ClientError> {
        self.send_action(ActionRequest::StopRecording { save })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn rename(&mut self, id: PathId, name: &str) -> Result<MutationOutcome, ClientError> {
        let origin = self.editable_origin(id)?;
        let path = self.store.get_mut(&id).ok_or(ClientError::UnknownPath(id))?;
        path.set_name(name)?;
        let sanitized = path.name().to_string();
        self.after_edit(
            id,
            origin,
            ActionRequest::Rename {
                path_id: id,
                name: sanitized,
            },
        )
    }

    pub fn recolor(&mut self, id: PathId, color: u32) -> Result<MutationOutcome, ClientError> {
        let origin = self.editable_origin(id)?;
        let path = self.store.get_mut(&id).ok_or(ClientError::UnknownPath(id))?;
        path.set_color(color)?;
        self.after_edit(id, origin, ActionRequest::Recolor { path_id: id, color })
    }

    /// Recolor from user input: a palette name or a hex value.
    pub fn recolor_from_str(
        &mut self,
        id: PathId,
        input: &str,
    ) -> Result<MutationOutcome, ClientError> {
        let color = parse_color(input)?;
        self.recolor(id, color)
    }

    /// Delete a local path, or ask the server to delete (or unshare) a server
    /// path. The path leaves the local view either way.
    pub fn delete(&mut self, id: PathId) -> Result<MutationOutcome, ClientError> {
        let origin = self.store.origin_of(&id).ok_or(ClientError::UnknownPath(id))?;
        self.store.remove(&id);
        match origin {
            Origin::Local => {
                if let Some(storage) = &self.storage {
                    if let Err(err) = storage.delete(&id) {
                        tracing::warn!(path_id = %id, error = %err, "failed to delete path file");
                    }
                }
                Ok(MutationOutcome::Applied)
            }
            Origin::ServerOwned | Origin::ServerShared => {
                Ok(self.send_or_fallback(ActionRequest::Delete { path_id: id }))
            }
        }
    }

    /// Share a path with another player. A local path is uploaded as a fork
    /// under a fresh id; the local original stays local.
    pub fn share(&mut self, id: PathId, target: ActorId) -> Result<MutationOutcome, ClientError> {
        let origin = self.store.origin_of(&id).ok_or(ClientError::UnknownPath(id))?;
        if self.connection.is_none() {
            return Err(ClientError::Offline);
        }
        let request = match origin {
            Origin::ServerShared => return Err(ClientError::NotOwner(id)),
            Origin::ServerOwned => ActionRequest::Share {
                path_id: id,
                target,
                upload: None,
            },
            Origin::Local => {
                let path = self.store.get(&id).ok_or(ClientError::UnknownPath(id))?;
                let fork = path.fork(self.actor, self.actor_name.clone());
                ActionRequest::Share {
                    path_id: fork.id(),
                    target,
                    upload: Some(fork),
                }
            }
        };
        self.send_action(request)?;
        Ok(MutationOutcome::Sent)
    }

    pub fn set_visible(&mut self, id: PathId) -> bool {
        self.store.set_visible(id)
    }

    pub fn hide(&mut self, id: PathId) -> bool {
        self.store.set_hidden(id)
    }

    fn editable_origin(&self, id: PathId) -> Result<Origin, ClientError> {
        match self.store.origin_of(&id) {
            None => Err(ClientError::UnknownPath(id)),
            Some(Origin::ServerShared) => Err(ClientError::NotOwner(id)),
            Some(origin) => Ok(origin),
        }
    }

    fn after_edit(
        &mut self,
        id: PathId,
        origin: Origin,
        request: ActionRequest,
    ) -> Result<MutationOutcome, ClientError> {
        if origin == Origin::Local {
            self.mark_dirty(id);
            return Ok(MutationOutcome::Applied);
        }
        Ok(self.send_or_fallback(request))
    }

    fn send_or_fallback(&self, request: ActionRequest) -> MutationOutcome {
        let kind = request.kind();
        match self.send_action(request) {
            Ok(()) => MutationOutcome::Sent,
            Err(err) => {
                tracing::warn!(
                    action = ?kind,
                    error = %err,
                    "server unreachable, keeping local change only"
                );
                MutationOutcome::LocalOnly
            }
        }
    }

    fn send_action(&self, request: ActionRequest) -> Result<(), ClientError> {
        let connection = self.connection.as_ref().ok_or(ClientError::Offline)?;
        connection.send(&ClientMessage::Action(request))?;
        Ok(())
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Decode and apply bytes received on `channel`. Anything undecodable is
    /// dropped whole.
    pub fn handle_message(&mut self, channel: Channel, bytes: &[u8]) -> Inbound {
        match decode::<ServerMessage>(channel, bytes) {
            Ok(message) => self.apply_message(message),
            Err(err) => {
                tracing::warn!(channel = %channel, error = %err, "dropping undecodable message");
                Inbound::Dropped
            }
        }
    }

    pub fn apply_message(&mut self, message: ServerMessage) -> Inbound {
        match message {
            ServerMessage::Result(result) => self.apply_result(result),
            ServerMessage::FullSync { paths } => {
                Inbound::Synced(self.reconciler.apply_snapshot(&mut self.store, paths))
            }
            ServerMessage::Shared { path } => {
                let id = path.id();
                if self.reconciler.apply_share(&mut self.store, path) {
                    Inbound::Shared(id)
                } else {
                    Inbound::Dropped
                }
            }
        }
    }

    fn apply_result(&mut self, result: ActionResult) -> Inbound {
        let Some(connection) = self.connection.as_mut() else {
            tracing::warn!(seq = result.seq, "action result without a connection");
            return Inbound::Dropped;
        };
        if !connection.advance_seq(result.seq) {
            let last_applied = connection.last_applied_seq();
            tracing::debug!(seq = result.seq, last_applied, "ignoring duplicate action result");
            // A resend means our ack was lost; repeat it so the server can stop.
            if let Err(err) = connection.send(&ClientMessage::Ack { seq: last_applied }) {
                tracing::warn!(
                    seq = last_applied,
                    error = %err,
                    "failed to re-acknowledge result"
                );
            }
            return Inbound::Duplicate;
        }

        let ActionResult {
            action,
            path_id,
            success,
            message,
            path,
            seq,
            ..
        } = result;
        if !success {
            tracing::info!(action = ?action, seq, message = %message, "server rejected action");
        }

        match (action, path) {
            (ActionKind::Delete, None) => {
                if let Some(id) = path_id {
                    self.store.remove(&id);
                }
            }
            (ActionKind::StartRecording, _) => {
                self.remote_recording = success;
            }
            (ActionKind::StopRecording, path) => {
                self.remote_recording = false;
                if let Some(path) = path {
                    self.reconciler.apply_update(&mut self.store, path);
                }
            }
            (_, Some(path)) => {
                self.reconciler.apply_update(&mut self.store, path);
            }
            (_, None) => {}
        }

        if let Some(connection) = self.connection.as_ref() {
            if let Err(err) = connection.send(&ClientMessage::Ack { seq }) {
                tracing::warn!(seq, error = %err, "failed to acknowledge result");
            }
        }
        Inbound::Result { action, success }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    fn mark_dirty(&self, id: PathId) {
        if let Some(storage) = &self.storage {
            storage.mark_dirty(id);
        }
    }

    /// Write every dirty local path now.
    pub fn save(&self) -> Option<SaveReport> {
        let storage = self.storage.as_ref()?;
        Some(storage.save_dirty(|id| self.local_copy(id)))
    }

    /// Capture dirty local paths for an [`trailmark_storage::AutosaveWorker`].
    pub fn autosave_batch(&self) -> Option<SaveBatch> {
        let storage = self.storage.as_ref()?;
        Some(storage.collect_dirty(|id| self.local_copy(id)))
    }

    fn local_copy(&self, id: &PathId) -> Option<Path> {
        match self.store.origin_of(id)? {
            Origin::Local => self.store.get(id).cloned(),
            Origin::ServerOwned | Origin::ServerShared => None,
        }
    }

    // ========================================================================
    // Commands and rendering
    // ========================================================================

    /// Case-insensitive lookup: this client's own paths first, then shared.
    pub fn find_by_name(&self, name: &str) -> Result<&Path, ValidationError> {
        let primary = self
            .store
            .all_with_origin(&[Origin::Local, Origin::ServerOwned]);
        let secondary = self.store.all_with_origin(&[Origin::ServerShared]);
        find_by_name(primary, secondary, name)
            .ok_or_else(|| ValidationError::UnknownPath(name.to_string()))
    }

    pub fn suggest(&self, prefix: &str) -> Vec<String> {
        let names = self.store.paths().into_iter().map(Path::name);
        suggest_names(names, prefix, self.config.suggestion_limit)
    }

    pub fn render_view(&self) -> RenderView {
        let mode: DisplayMode = self.config.display_mode;
        RenderView {
            paths: self
                .store
                .visible_paths()
                .into_iter()
                .map(|path| RenderPath::from_path(path, mode))
                .collect(),
            live: self
                .recording
                .as_ref()
                .map(|session| RenderPath::from_path(session.path(), DisplayMode::Line)),
        }
    }
}
