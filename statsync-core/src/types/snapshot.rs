use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{SnapshotId, SubjectId};
use crate::error::SyncError;

/// Which crawler produced a snapshot. Each kind keeps its own staleness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Stats,
    Identity,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Stats => "stats",
            SnapshotKind::Identity => "identity",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stats" => Ok(Self::Stats),
            "identity" => Ok(Self::Identity),
            other => Err(SyncError::Internal(format!(
                "unknown snapshot kind {other}"
            ))),
        }
    }
}

/// One timestamped observation of a subject. Never mutated once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub kind: SnapshotKind,
    pub subject_id: SubjectId,
    pub fetched_at: DateTime<Utc>,
    pub raw_payload: Value,
    pub derived: Value,
}

impl Snapshot {
    pub fn new(
        kind: SnapshotKind,
        subject_id: SubjectId,
        fetched_at: DateTime<Utc>,
        raw_payload: Value,
        derived: Value,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            kind,
            subject_id,
            fetched_at,
            raw_payload,
            derived,
        }
    }

    /// URL observed for `slot`, if this snapshot carries one.
    pub fn texture_url(&self, slot: TextureSlot) -> Option<&str> {
        self.derived
            .get(slot.field_name())
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureSlot {
    Skin,
    Cape,
    SecondaryCape,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 3] =
        [TextureSlot::Skin, TextureSlot::Cape, TextureSlot::SecondaryCape];

    /// Key of the slot's URL inside an identity snapshot's derived object.
    pub fn field_name(&self) -> &'static str {
        match self {
            TextureSlot::Skin => "skin_url",
            TextureSlot::Cape => "cape_url",
            TextureSlot::SecondaryCape => "secondary_cape_url",
        }
    }
}

impl FromStr for TextureSlot {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skin" => Ok(Self::Skin),
            "cape" => Ok(Self::Cape),
            "secondary_cape" => Ok(Self::SecondaryCape),
            other => Err(SyncError::Internal(format!(
                "unknown texture slot {other}"
            ))),
        }
    }
}

/// Entry of the deduplicated texture history view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureHistoryItem {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
}

/// Derived texture set written by the identity crawler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSet {
    pub name: String,
    pub skin_url: Option<String>,
    pub cape_url: Option<String>,
    pub secondary_cape_url: Option<String>,
}
