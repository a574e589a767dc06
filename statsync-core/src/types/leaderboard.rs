use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::SubjectId;

/// Cache key of a ranked list: one stat inside one scope (game mode).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaderboardKey {
    pub stat: String,
    pub scope: String,
}

impl LeaderboardKey {
    pub fn new(stat: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            stat: stat.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Display for LeaderboardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stat, self.scope)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub subject_id: SubjectId,
    pub display_name: String,
    pub value: Option<f64>,
    /// 1-based, strictly increasing with position.
    pub rank: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    pub id: Uuid,
    pub key: LeaderboardKey,
    pub rows: Vec<LeaderboardRow>,
    pub fetched_at: DateTime<Utc>,
}

impl LeaderboardSnapshot {
    pub fn new(
        key: LeaderboardKey,
        rows: Vec<LeaderboardRow>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            key,
            rows,
            fetched_at,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }
}
