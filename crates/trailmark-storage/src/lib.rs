//! Trailmark Local Path Storage
//!
//! Durable home for paths that only exist on this client:
//!
//! ```text
//! ┌──────────────┐  mark_dirty   ┌───────────────┐  write_batch  ┌──────────────┐
//! │  Path Store  │──────────────►│  Dirty Set    │──────────────►│  <uuid>.json │
//! │  (in memory) │               │ (generations) │               │  index.json  │
//! └──────────────┘               └───────────────┘               └──────────────┘
//!        ▲                                                              │
//!        └──────────────────────── load (index + orphans) ◄─────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Atomic**: every file is replaced through a synced temp file + rename
//! - **Recoverable**: files missing from the index are found by a directory
//!   scan on load, so a crash between a path write and the index write loses
//!   nothing
//! - **Retrying**: an id leaves the dirty set only after its file write
//!   succeeded; failures are logged and retried on the next save
//! - **Serialized**: saves, deletes and loads on one storage never overlap

pub mod autosave;
pub mod persistence;


use parking_lot::Mutex;
use persistence::{
    file_name_for, parse_path_file_name, read_json, read_path_file, write_json, IndexEntry,
    IndexFile, INDEX_FILE_NAME,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use trailmark_model::{Path, PathId, ValidationError};

pub use autosave::AutosaveWorker;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schema version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("file {file} holds path {found}, expected {expected}")]
    IdMismatch {
        file: String,
        expected: PathId,
        found: PathId,
    },

    #[error("invalid record: {0}")]
    Validation(#[from] ValidationError),
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the index and one file per path
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./trailmark"),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of [`PathStorage::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub paths: Vec<Path>,
    /// Ids found on disk but missing from the index
    pub recovered: Vec<PathId>,
    /// Files that could not be read, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Outcome of a save pass.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub written: Vec<PathId>,
    pub failed: Vec<(PathId, String)>,
    pub index_written: bool,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Paths captured for writing, each with the dirty generation it was taken
/// at. Built on the owning thread, written wherever convenient.
#[derive(Debug, Default)]
pub struct SaveBatch {
    entries: Vec<(Path, u64)>,
}

impl SaveBatch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Default)]
struct DirtySet {
    generation: u64,
    ids: HashMap<PathId, u64>,
}

/// On-disk store for LOCAL paths.
pub struct PathStorage {
    config: StorageConfig,
    /// id -> file name, mirrors index.json
    index: Mutex<BTreeMap<PathId, String>>,
    dirty: Mutex<DirtySet>,
    /// Held for the whole of any operation that touches files
    io_lock: Mutex<()>,
}

impl PathStorage {
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.root)?;
        Ok(Self {
            config,
            index: Mutex::new(BTreeMap::new()),
            dirty: Mutex::new(DirtySet::default()),
            io_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.config.root
    }

    fn index_path(&self) -> PathBuf {
        self.config.root.join(INDEX_FILE_NAME)
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Read every path listed in the index, then every `<uuid>.json` the
    /// index does not mention. Unreadable files are reported, not fatal.
    pub fn load(&self) -> Result<LoadReport, StorageError> {
        let _io = self.io_lock.lock();
        let mut report = LoadReport::default();
        let mut loaded: BTreeMap<PathId, String> = BTreeMap::new();

        let listed = match read_json::<IndexFile>(&self.index_path()) {
            Ok(index) => index.entries,
            Err(StorageError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                tracing::warn!(
                    path = %self.index_path().display(),
                    error = %err,
                    "unreadable path index, recovering from directory scan"
                );
                Vec::new()
            }
        };
        let listed_count = listed.len();

        for entry in listed {
            // Only `<id>.json` directly under the root is trusted.
            if parse_path_file_name(&entry.file) != Some(entry.id) {
                tracing::warn!(
                    path_id = %entry.id,
                    file = %entry.file,
                    "ignoring index entry with unexpected file name"
                );
                continue;
            }
            let file = self.config.root.join(&entry.file);
            match self.load_one(&file, &entry.id) {
                Ok(path) => {
                    loaded.insert(entry.id, entry.file);
                    report.paths.push(path);
                }
                Err(err) => {
                    tracing::warn!(path = %file.display(), error = %err, "skipping path file");
                    report.skipped.push((file, err.to_string()));
                }
            }
        }

        for dir_entry in std::fs::read_dir(&self.config.root)? {
            let dir_entry = dir_entry?;
            let file_name = dir_entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(id) = parse_path_file_name(file_name) else {
                continue;
            };
            if loaded.contains_key(&id) || report.skipped.iter().any(|(p, _)| p == &dir_entry.path()) {
                continue;
            }
            let file = dir_entry.path();
            match self.load_one(&file, &id) {
                Ok(path) => {
                    tracing::info!(path_id = %id, "recovered path missing from index");
                    loaded.insert(id, file_name.to_string());
                    report.recovered.push(id);
                    report.paths.push(path);
                }
                Err(err) => {
                    tracing::warn!(path = %file.display(), error = %err, "skipping orphan path file");
                    report.skipped.push((file, err.to_string()));
                }
            }
        }

        let index_stale = !report.recovered.is_empty() || loaded.len() != listed_count;
        *self.index.lock() = loaded;
        if index_stale {
            if let Err(err) = self.write_index_locked() {
                tracing::warn!(error = %err, "failed to rewrite path index after load");
            }
        }

        Ok(report)
    }

    fn load_one(&self, file: &std::path::Path, expected: &PathId) -> Result<Path, StorageError> {
        let path = read_path_file(file)?;
        if path.id() != *expected {
            return Err(StorageError::IdMismatch {
                file: file.display().to_string(),
                expected: *expected,
                found: path.id(),
            });
        }
        Ok(path)
    }

    // ========================================================================
    // Dirty tracking
    // ========================================================================

    pub fn mark_dirty(&self, id: PathId) {
        let mut dirty = self.dirty.lock();
        dirty.generation += 1;
        let generation = dirty.generation;
        dirty.ids.insert(id, generation);
    }

    pub fn is_dirty(&self, id: &PathId) -> bool {
        self.dirty.lock().ids.contains_key(id)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.lock().ids.len()
    }

    /// Snapshot every dirty id through `lookup`. Ids the lookup no longer
    /// knows are dropped from the dirty set.
    pub fn collect_dirty<F>(&self, mut lookup: F) -> SaveBatch
    where
        F: FnMut(&PathId) -> Option<Path>,
    {
        let mut dirty = self.dirty.lock();
        let mut batch = SaveBatch::default();
        let mut gone = Vec::new();
        for (id, generation) in dirty.ids.iter() {
            match lookup(id) {
                Some(path) => batch.entries.push((path, *generation)),
                None => gone.push(*id),
            }
        }
        for id in gone {
            dirty.ids.remove(&id);
        }
        batch
    }

    // ========================================================================
    // Save / delete
    // ========================================================================

    /// Write every dirty path `lookup` still knows about.
    pub fn save_dirty<F>(&self, lookup: F) -> SaveReport
    where
        F: FnMut(&PathId) -> Option<Path>,
    {
        let batch = self.collect_dirty(lookup);
        self.write_batch(batch)
    }

    /// Write a batch. An id is cleared from the dirty set only if its write
    /// succeeded and it was not marked dirty again after the batch was taken.
    pub fn write_batch(&self, batch: SaveBatch) -> SaveReport {
        let _io = self.io_lock.lock();
        let mut report = SaveReport::default();
        let mut index_changed = false;

        for (path, generation) in batch.entries {
            let id = path.id();
            let file_name = file_name_for(&id);
            let target = self.config.root.join(&file_name);
            let record = persistence::PathRecord::from(&path);
            match write_json(&target, &record) {
                Ok(()) => {
                    {
                        let mut dirty = self.dirty.lock();
                        if dirty.ids.get(&id) == Some(&generation) {
                            dirty.ids.remove(&id);
                        }
                    }
                    let previous = self.index.lock().insert(id, file_name);
                    index_changed |= previous.is_none();
                    report.written.push(id);
                }
                Err(err) => {
                    tracing::warn!(path_id = %id, error = %err, "failed to save path, will retry");
                    report.failed.push((id, err.to_string()));
                }
            }
        }

        if index_changed {
            match self.write_index_locked() {
                Ok(()) => report.index_written = true,
                Err(err) => tracing::warn!(error = %err, "failed to write path index"),
            }
        }
        report
    }

    /// Remove a path's file and index entry. A file that is already gone is
    /// not an error.
    pub fn delete(&self, id: &PathId) -> Result<(), StorageError> {
        let _io = self.io_lock.lock();
        self.dirty.lock().ids.remove(id);
        let file_name = self
            .index
            .lock()
            .remove(id)
            .unwrap_or_else(|| file_name_for(id));
        match std::fs::remove_file(self.config.root.join(file_name)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.write_index_locked()
    }

    pub fn indexed_ids(&self) -> Vec<PathId> {
        self.index.lock().keys().copied().collect()
    }

    /// Caller must hold `io_lock`.
    fn write_index_locked(&self) -> Result<(), StorageError> {
        let entries = self
            .index
            .lock()
            .iter()
            .map(|(id, file)| IndexEntry {
                id: *id,
                file: file.clone(),
            })
            .collect();
        write_json(&self.index_path(), &IndexFile::new(entries))
    }
}

// ============================================================================
// Convenience Functions
// ============================================================================

/// Open storage rooted at `dir` with default settings.
pub fn open_storage(dir: impl Into<PathBuf>) -> Result<PathStorage, StorageError> {
    PathStorage::open(StorageConfig { root: dir.into() })
}
