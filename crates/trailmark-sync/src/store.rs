//! Client-side path store
//!
//! Holds every path this client knows about, each tagged with exactly one
//! [`Origin`], plus the set of ids the user wants drawn. Visibility entries
//! can only exist for stored ids and leave together with their path.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use trailmark_model::{ActorId, Path, PathId};

/// Where a known path's authority lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Recorded on this client; the server has not seen it
    Local,
    /// The server knows this client as the owner
    ServerOwned,
    /// Another player shared it with this client
    ServerShared,
}

impl Origin {
    pub const SERVER: [Origin; 2] = [Origin::ServerOwned, Origin::ServerShared];

    pub fn is_server(&self) -> bool {
        matches!(self, Origin::ServerOwned | Origin::ServerShared)
    }
}

#[derive(Debug, Clone)]
struct StoredPath {
    path: Path,
    origin: Origin,
}

#[derive(Debug, Default)]
pub struct PathStore {
    entries: BTreeMap<PathId, StoredPath>,
    visible: HashSet<PathId>,
}

impl PathStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert or replace a path. The origin tag is replaced too; visibility
    /// is left as it was. Returns the previous origin, if any.
    pub fn upsert(&mut self, path: Path, origin: Origin) -> Option<Origin> {
        let id = path.id();
        self.entries
            .insert(id, StoredPath { path, origin })
            .map(|previous| previous.origin)
    }

    /// Remove a path along with its origin tag and visibility.
    pub fn remove(&mut self, id: &PathId) -> Option<(Path, Origin)> {
        self.visible.remove(id);
        self.entries
            .remove(id)
            .map(|stored| (stored.path, stored.origin))
    }

    pub fn get_mut(&mut self, id: &PathId) -> Option<&mut Path> {
        self.entries.get_mut(id).map(|stored| &mut stored.path)
    }

    /// Mark a stored path visible. Unknown ids are refused.
    pub fn set_visible(&mut self, id: PathId) -> bool {
        if !self.entries.contains_key(&id) {
            return false;
        }
        self.visible.insert(id);
        true
    }

    pub fn set_hidden(&mut self, id: PathId) -> bool {
        if !self.entries.contains_key(&id) {
            return false;
        }
        self.visible.remove(&id);
        true
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get(&self, id: &PathId) -> Option<&Path> {
        self.entries.get(id).map(|stored| &stored.path)
    }

    pub fn contains(&self, id: &PathId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn origin_of(&self, id: &PathId) -> Option<Origin> {
        self.entries.get(id).map(|stored| stored.origin)
    }

    pub fn is_visible(&self, id: &PathId) -> bool {
        self.visible.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PathId> + '_ {
        self.entries.keys().copied()
    }

    /// All paths, oldest first.
    pub fn paths(&self) -> Vec<&Path> {
        self.collect(|_| true)
    }

    /// Paths whose origin is one of `origins`, oldest first.
    pub fn all_with_origin(&self, origins: &[Origin]) -> Vec<&Path> {
        self.collect(|stored| origins.contains(&stored.origin))
    }

    pub fn ids_with_origin(&self, origins: &[Origin]) -> Vec<PathId> {
        self.entries
            .iter()
            .filter(|(_, stored)| origins.contains(&stored.origin))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Visible paths, oldest first.
    pub fn visible_paths(&self) -> Vec<&Path> {
        self.collect(|stored| self.visible.contains(&stored.path.id()))
    }

    pub fn paths_owned_by(&self, owner: &ActorId) -> Vec<&Path> {
        self.collect(|stored| stored.path.owner_id() == *owner)
    }

    fn collect<F>(&self, mut keep: F) -> Vec<&Path>
    where
        F: FnMut(&StoredPath) -> bool,
    {
        let mut out: Vec<&Path> = self
            .entries
            .values()
            .filter(|stored| keep(stored))
            .map(|stored| &stored.path)
            .collect();
        out.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(&b.id())));
        out
    }
}
