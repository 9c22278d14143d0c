//! The path entity and its identifiers.

use crate::color::derive_color;
use crate::error::ValidationError;
use crate::name::{deserialize_sanitized, sanitize_name};
use crate::point::Point;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Globally unique path identifier, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(Uuid);

impl PathId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PathId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for PathId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// Identity of a player (recording actor, owner, share recipient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Where a path was originally recorded. Points at itself unless the path is
/// a fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub origin_id: PathId,
    pub origin_owner_id: ActorId,
    pub origin_owner_name: String,
}

// ============================================================================
// Path
// ============================================================================

/// A named, owned, ordered point sequence in one dimension.
///
/// Two paths are equal when their ids are equal; everything else may differ
/// between client and server until the next sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    id: PathId,
    #[serde(deserialize_with = "deserialize_sanitized")]
    name: String,
    owner_id: ActorId,
    owner_name: String,
    lineage: Lineage,
    created_at: DateTime<Utc>,
    dimension: String,
    #[serde(default)]
    points: Vec<Point>,
    /// Zero until explicitly set; see [`Path::color`].
    #[serde(default)]
    color: u32,
    #[serde(default)]
    shared_with: BTreeSet<ActorId>,
}

impl Path {
    pub fn new(
        name: Option<&str>,
        owner_id: ActorId,
        owner_name: impl Into<String>,
        dimension: impl Into<String>,
    ) -> Self {
        Self::with_id(PathId::new(), name, owner_id, owner_name, dimension, Utc::now())
    }

    pub fn with_id(
        id: PathId,
        name: Option<&str>,
        owner_id: ActorId,
        owner_name: impl Into<String>,
        dimension: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let owner_name = owner_name.into();
        Self {
            id,
            name: sanitize_name(name),
            owner_id,
            lineage: Lineage {
                origin_id: id,
                origin_owner_id: owner_id,
                origin_owner_name: owner_name.clone(),
            },
            owner_name,
            created_at,
            dimension: dimension.into(),
            points: Vec::new(),
            color: 0,
            shared_with: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename. Blank input is rejected; anything else is sanitized.
    pub fn set_name(&mut self, name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        self.name = sanitize_name(Some(name));
        Ok(())
    }

    pub fn owner_id(&self) -> ActorId {
        self.owner_id
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn set_lineage(&mut self, lineage: Lineage) {
        self.lineage = lineage;
    }

    pub fn is_fork(&self) -> bool {
        self.lineage.origin_id != self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn last_point(&self) -> Option<&Point> {
        self.points.last()
    }

    pub fn push_point(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn set_points(&mut self, points: Vec<Point>) {
        self.points = points;
    }

    pub fn with_points(mut self, points: Vec<Point>) -> Self {
        self.points = points;
        self
    }

    /// Effective color: the explicit one if set, otherwise the palette entry
    /// derived from the id.
    pub fn color(&self) -> u32 {
        if self.color != 0 {
            self.color
        } else {
            derive_color(&self.id)
        }
    }

    /// The stored color, zero when never set.
    pub fn explicit_color(&self) -> Option<u32> {
        (self.color != 0).then_some(self.color)
    }

    pub fn set_color(&mut self, color: u32) -> Result<(), ValidationError> {
        if color == 0 {
            return Err(ValidationError::InvalidColor("0".to_string()));
        }
        self.color = color;
        Ok(())
    }

    pub fn shared_with(&self) -> &BTreeSet<ActorId> {
        &self.shared_with
    }

    pub fn is_shared_with(&self, actor: &ActorId) -> bool {
        self.shared_with.contains(actor)
    }

    pub fn share_with(&mut self, actor: ActorId) -> bool {
        self.shared_with.insert(actor)
    }

    pub fn unshare(&mut self, actor: &ActorId) -> bool {
        self.shared_with.remove(actor)
    }

    /// Copy this path under a fresh id for `owner`, recording this path as
    /// the origin. The copy keeps the resolved color and starts unshared.
    pub fn fork(&self, owner_id: ActorId, owner_name: impl Into<String>) -> Path {
        let mut copy = Path::with_id(
            PathId::new(),
            Some(&self.name),
            owner_id,
            owner_name,
            self.dimension.clone(),
            Utc::now(),
        );
        copy.points = self.points.clone();
        copy.color = self.color();
        copy.lineage = Lineage {
            origin_id: self.id,
            origin_owner_id: self.owner_id,
            origin_owner_name: self.owner_name.clone(),
        };
        copy
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
