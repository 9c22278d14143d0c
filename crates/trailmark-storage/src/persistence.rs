//! On-disk record formats and atomic file replacement
//!
//! Layout of a storage root:
//!
//! ```text
//! <root>/
//!   index.json                 { schema_version, entries: [{ id, file }] }
//!   <uuid>.json                one record per LOCAL path
//!   <uuid>.json.tmp            transient, only while a write is in flight
//! ```
//!
//! Every write goes to a `.tmp` sibling first, is synced, then renamed over
//! the target, so a reader sees either the old or the new file, never a torn
//! one.

use crate::StorageError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path as FsPath;
use trailmark_model::{ActorId, Lineage, Path, PathId, Point};

/// Current record schema. Records with a higher version are skipped on load.
pub const SCHEMA_VERSION: u32 = 1;

pub const INDEX_FILE_NAME: &str = "index.json";

const PATH_FILE_SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = "tmp";

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRecord {
    pub schema_version: u32,
    pub id: PathId,
    pub name: String,
    pub owner_id: ActorId,
    pub owner_name: String,
    pub origin_id: PathId,
    pub origin_owner_id: ActorId,
    pub origin_owner_name: String,
    pub created_at: DateTime<Utc>,
    pub dimension: String,
    pub color: u32,
    pub points: Vec<Point>,
    /// Recipients of a server-side path. Empty for client files.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub shared_with: BTreeSet<ActorId>,
}

impl From<&Path> for PathRecord {
    fn from(path: &Path) -> Self {
        let lineage = path.lineage();
        Self {
            schema_version: SCHEMA_VERSION,
            id: path.id(),
            name: path.name().to_string(),
            owner_id: path.owner_id(),
            owner_name: path.owner_name().to_string(),
            origin_id: lineage.origin_id,
            origin_owner_id: lineage.origin_owner_id,
            origin_owner_name: lineage.origin_owner_name.clone(),
            created_at: path.created_at(),
            dimension: path.dimension().to_string(),
            // Pin the resolved color so the file is self-describing.
            color: path.color(),
            points: path.points().to_vec(),
            shared_with: path.shared_with().clone(),
        }
    }
}

impl TryFrom<PathRecord> for Path {
    type Error = StorageError;

    fn try_from(record: PathRecord) -> Result<Self, Self::Error> {
        if record.schema_version > SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: record.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        let mut path = Path::with_id(
            record.id,
            Some(&record.name),
            record.owner_id,
            record.owner_name,
            record.dimension,
            record.created_at,
        );
        path.set_lineage(Lineage {
            origin_id: record.origin_id,
            origin_owner_id: record.origin_owner_id,
            origin_owner_name: record.origin_owner_name,
        });
        if record.color != 0 {
            path.set_color(record.color)?;
        }
        path.set_points(record.points);
        for actor in record.shared_with {
            path.share_with(actor);
        }
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: PathId,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub schema_version: u32,
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}

impl IndexFile {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            entries,
        }
    }
}

// ============================================================================
// File naming
// ============================================================================

pub fn file_name_for(id: &PathId) -> String {
    format!("{id}{PATH_FILE_SUFFIX}")
}

/// Recognize `<uuid>.json`; anything else in the root is ignored.
pub fn parse_path_file_name(file_name: &str) -> Option<PathId> {
    let stem = file_name.strip_suffix(PATH_FILE_SUFFIX)?;
    stem.parse().ok()
}

// ============================================================================
// IO
// ============================================================================

/// Replace `target` with `bytes` via a synced temp file and a rename.
pub fn write_atomic(target: &FsPath, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = target.as_os_str().to_owned();
    tmp_name.push(".");
    tmp_name.push(TMP_SUFFIX);
    let tmp = std::path::PathBuf::from(tmp_name);

    let result = (|| -> Result<(), StorageError> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, target)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

pub fn write_json<T: Serialize>(target: &FsPath, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(target, &bytes)
}

pub fn read_json<T: DeserializeOwned>(source: &FsPath) -> Result<T, StorageError> {
    let bytes = fs::read(source)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn read_path_file(source: &FsPath) -> Result<Path, StorageError> {
    let record: PathRecord = read_json(source)?;
    Path::try_from(record)
}
