use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::database::ports::SnapshotRepository;
use crate::error::Result;
use crate::types::{Snapshot, SnapshotKind, SubjectId};

/// Rows are kept in insertion order per `(kind, subject)`.
#[derive(Debug, Default)]
pub struct MemorySnapshotRepository {
    rows: RwLock<HashMap<(SnapshotKind, SubjectId), Vec<Snapshot>>>,
}

impl MemorySnapshotRepository {
    pub fn count(&self, kind: SnapshotKind, subject: &SubjectId) -> usize {
        self.rows
            .read()
            .get(&(kind, subject.clone()))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl SnapshotRepository for MemorySnapshotRepository {
    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        self.rows
            .write()
            .entry((snapshot.kind, snapshot.subject_id.clone()))
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn latest_fetched_at(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .rows
            .read()
            .get(&(kind, subject.clone()))
            .and_then(|rows| rows.iter().map(|s| s.fetched_at).max()))
    }

    async fn latest_fetched_all(
        &self,
        kind: SnapshotKind,
    ) -> Result<HashMap<SubjectId, DateTime<Utc>>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|((row_kind, _), _)| *row_kind == kind)
            .filter_map(|((_, subject), rows)| {
                rows.iter()
                    .map(|s| s.fetched_at)
                    .max()
                    .map(|latest| (subject.clone(), latest))
            })
            .collect())
    }

    async fn latest(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Option<Snapshot>> {
        Ok(self.list_newest_first(kind, subject).await?.into_iter().next())
    }

    async fn list_newest_first(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Vec<Snapshot>> {
        let mut rows = self
            .rows
            .read()
            .get(&(kind, subject.clone()))
            .cloned()
            .unwrap_or_default();
        // Stable sort keeps insertion order between equal timestamps; reverse
        // afterwards so the last written of a tie comes first.
        rows.sort_by_key(|s| s.fetched_at);
        rows.reverse();
        Ok(rows)
    }
}
