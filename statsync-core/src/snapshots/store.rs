use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::history::TextureHistory;
use crate::clock::Clock;
use crate::database::ports::SnapshotRepository;
use crate::error::Result;
use crate::types::{Snapshot, SnapshotKind, SubjectId, TextureSlot};

/// Append-only snapshot storage plus the derived texture history view.
///
/// Storage never deduplicates: a fetch identical to the previous one is still
/// a new row, because staleness is computed from the newest row.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    repo: Arc<dyn SnapshotRepository>,
    clock: Arc<dyn Clock>,
}

impl SnapshotStore {
    pub fn new(repo: Arc<dyn SnapshotRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// `None` means the subject was never synced, i.e. maximally stale.
    pub async fn latest_fetched_at(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Option<DateTime<Utc>>> {
        self.repo.latest_fetched_at(kind, subject).await
    }

    pub async fn latest_fetched_all(
        &self,
        kind: SnapshotKind,
    ) -> Result<HashMap<SubjectId, DateTime<Utc>>> {
        self.repo.latest_fetched_all(kind).await
    }

    pub async fn latest(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Option<Snapshot>> {
        self.repo.latest(kind, subject).await
    }

    /// Inserts a new snapshot stamped with the current time.
    pub async fn append(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
        raw_payload: Value,
        derived: Value,
    ) -> Result<Snapshot> {
        let snapshot = Snapshot::new(
            kind,
            subject.clone(),
            self.clock.now(),
            raw_payload,
            derived,
        );
        self.repo.append(&snapshot).await?;
        Ok(snapshot)
    }

    /// Texture history of `subject` for `slot`, recomputed from a full scan
    /// of its identity snapshots on every call.
    pub async fn history(
        &self,
        subject: &SubjectId,
        slot: TextureSlot,
    ) -> Result<TextureHistory> {
        let snapshots = self
            .repo
            .list_newest_first(SnapshotKind::Identity, subject)
            .await?;
        Ok(TextureHistory::new(snapshots, slot))
    }
}
