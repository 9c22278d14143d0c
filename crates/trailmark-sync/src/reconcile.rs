//! Snapshot reconciliation
//!
//! Merges what the server says into the client's [`PathStore`] without losing
//! what only the client knows:
//!
//! ```text
//!   before                      snapshot {B, C}            after
//!   A  Local         visible    ─────────────────►         A  Local         visible
//!   B  ServerShared  hidden                                B  ServerShared  hidden
//!   D  ServerOwned   visible                               C  ServerShared  visible (new)
//!                                                          (D removed)
//! ```
//!
//! Server-attributed paths are replaced wholesale; visibility survives for
//! ids that were already known and defaults to visible for new ones. Local
//! paths are never touched, and an incoming entry that collides with a local
//! id is dropped.

use crate::store::{Origin, PathStore};
use std::collections::HashSet;
use trailmark_model::{ActorId, Path, PathId};

/// Counts describing one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids the client had not seen before
    pub added: usize,
    /// Known ids that stay visible
    pub retained_visible: usize,
    /// Known ids that stay hidden
    pub retained_hidden: usize,
    /// Server-attributed ids missing from the snapshot
    pub removed: usize,
    /// Incoming entries dropped because a local path owns the id
    pub skipped_local: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    local_actor: ActorId,
}

impl Reconciler {
    pub fn new(local_actor: ActorId) -> Self {
        Self { local_actor }
    }

    pub fn local_actor(&self) -> ActorId {
        self.local_actor
    }

    /// Origin tag for a path delivered by the server.
    pub fn classify(&self, path: &Path) -> Origin {
        if path.owner_id() == self.local_actor {
            Origin::ServerOwned
        } else {
            Origin::ServerShared
        }
    }

    /// Replace every server-attributed path with the snapshot contents.
    pub fn apply_snapshot(&self, store: &mut PathStore, snapshot: Vec<Path>) -> ReconcileReport {
        let previously_known: HashSet<PathId> =
            store.ids_with_origin(&Origin::SERVER).into_iter().collect();
        let preserve_visible: HashSet<PathId> = previously_known
            .iter()
            .copied()
            .filter(|id| store.is_visible(id))
            .collect();

        for id in &previously_known {
            store.remove(id);
        }

        let mut report = ReconcileReport::default();
        let mut incoming: HashSet<PathId> = HashSet::new();
        for path in snapshot {
            let id = path.id();
            if incoming.contains(&id) {
                tracing::warn!(path_id = %id, "duplicate snapshot entry, keeping the first");
                continue;
            }
            if store.origin_of(&id) == Some(Origin::Local) {
                tracing::warn!(path_id = %id, "snapshot entry collides with a local path");
                report.skipped_local += 1;
                continue;
            }
            let origin = self.classify(&path);
            store.upsert(path, origin);
            incoming.insert(id);

            if preserve_visible.contains(&id) {
                store.set_visible(id);
                report.retained_visible += 1;
            } else if !previously_known.contains(&id) {
                store.set_visible(id);
                report.added += 1;
            } else {
                store.set_hidden(id);
                report.retained_hidden += 1;
            }
        }
        report.removed = previously_known.difference(&incoming).count();

        tracing::debug!(
            added = report.added,
            retained_visible = report.retained_visible,
            retained_hidden = report.retained_hidden,
            removed = report.removed,
            skipped_local = report.skipped_local,
            "applied server snapshot"
        );
        report
    }

    /// A single path was just shared with this client. Always made visible.
    /// Returns false when the id belongs to a local path.
    pub fn apply_share(&self, store: &mut PathStore, path: Path) -> bool {
        let id = path.id();
        if store.origin_of(&id) == Some(Origin::Local) {
            tracing::warn!(path_id = %id, "shared path collides with a local path, skipping");
            return false;
        }
        let origin = self.classify(&path);
        store.upsert(path, origin);
        store.set_visible(id);
        true
    }

    /// Authoritative state of one path, e.g. attached to an action result.
    /// Known ids keep their visibility, new ids become visible. A local id
    /// echoed back by the server is now held server-side and is retagged.
    pub fn apply_update(&self, store: &mut PathStore, path: Path) -> Origin {
        let id = path.id();
        let previous = store.origin_of(&id);
        if previous == Some(Origin::Local) {
            tracing::debug!(path_id = %id, "local path adopted by the server");
        }
        let origin = self.classify(&path);
        store.upsert(path, origin);
        if previous.is_none() {
            store.set_visible(id);
        }
        origin
    }
}
