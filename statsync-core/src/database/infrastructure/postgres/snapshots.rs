use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::subject_from_column;
use crate::database::ports::SnapshotRepository;
use crate::error::{Result, SyncError};
use crate::types::{Snapshot, SnapshotId, SnapshotKind, SubjectId};

#[derive(Clone, Debug)]
pub struct PostgresSnapshotRepository {
    pool: PgPool,
}

impl PostgresSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    id: Uuid,
    kind: String,
    subject_id: String,
    fetched_at: DateTime<Utc>,
    raw_payload: Json<Value>,
    derived: Json<Value>,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = SyncError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        Ok(Snapshot {
            id: SnapshotId(row.id),
            kind: row.kind.parse()?,
            subject_id: subject_from_column(&row.subject_id)?,
            fetched_at: row.fetched_at,
            raw_payload: row.raw_payload.0,
            derived: row.derived.0,
        })
    }
}

#[async_trait]
impl SnapshotRepository for PostgresSnapshotRepository {
    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subject_snapshots
                (id, kind, subject_id, fetched_at, raw_payload, derived)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.id.0)
        .bind(snapshot.kind.as_str())
        .bind(snapshot.subject_id.as_str())
        .bind(snapshot.fetched_at)
        .bind(Json(&snapshot.raw_payload))
        .bind(Json(&snapshot.derived))
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("snapshot insert failed: {e}")))?;
        Ok(())
    }

    async fn latest_fetched_at(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar(
            r#"
            SELECT MAX(fetched_at)
            FROM subject_snapshots
            WHERE kind = $1 AND subject_id = $2
            "#,
        )
        .bind(kind.as_str())
        .bind(subject.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("staleness lookup failed: {e}")))
    }

    async fn latest_fetched_all(
        &self,
        kind: SnapshotKind,
    ) -> Result<HashMap<SubjectId, DateTime<Utc>>> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            r#"
            SELECT subject_id, MAX(fetched_at)
            FROM subject_snapshots
            WHERE kind = $1
            GROUP BY subject_id
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("staleness scan failed: {e}")))?;

        rows.into_iter()
            .map(|(subject, latest)| Ok((subject_from_column(&subject)?, latest)))
            .collect()
    }

    async fn latest(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, kind, subject_id, fetched_at, raw_payload, derived
            FROM subject_snapshots
            WHERE kind = $1 AND subject_id = $2
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .bind(subject.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("snapshot lookup failed: {e}")))?;

        row.map(Snapshot::try_from).transpose()
    }

    async fn list_newest_first(
        &self,
        kind: SnapshotKind,
        subject: &SubjectId,
    ) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, kind, subject_id, fetched_at, raw_payload, derived
            FROM subject_snapshots
            WHERE kind = $1 AND subject_id = $2
            ORDER BY fetched_at DESC, id DESC
            "#,
        )
        .bind(kind.as_str())
        .bind(subject.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("snapshot listing failed: {e}")))?;

        rows.into_iter().map(Snapshot::try_from).collect()
    }
}
