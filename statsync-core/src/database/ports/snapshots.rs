use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Snapshot, SnapshotKind, SubjectId};

/// Append-only snapshot storage. Nothing here updates or deletes rows.
#[async_trait]
pub trait SnapshotRepository: Send + Sync + fmt::Debug {
    async fn append(&self, snapshot: &Snapshot) -> Result<()>;

    async fn latest_fetched_at(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Option<DateTime<Utc>>>;

    /// `max(fetched_at)` per subject that has at least one snapshot of `kind`.
    async fn latest_fetched_all(
        &self,
        kind: SnapshotKind,
    ) -> Result<HashMap<SubjectId, DateTime<Utc>>>;

    async fn latest(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Option<Snapshot>>;

    /// Every snapshot of `kind` for `subject`, newest first.
    async fn list_newest_first(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Vec<Snapshot>>;
}
