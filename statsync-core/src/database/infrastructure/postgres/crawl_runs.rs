use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{count_from_column, count_to_column, subject_from_column};
use crate::database::ports::{CrawlEventRepository, CrawlRunRepository};
use crate::error::{Result, SyncError};
use crate::types::{CrawlEvent, CrawlRun, RunId, RunSummary};

#[derive(Clone, Debug)]
pub struct PostgresCrawlRunRepository {
    pool: PgPool,
}

impl PostgresCrawlRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn complete(
        &self,
        id: RunId,
        ran: bool,
        message: Option<&str>,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE crawl_runs
            SET ran = $2,
                candidates = $3,
                processed = $4,
                snapshotted = $5,
                secondary_changes = $6,
                errors = $7,
                error_message = $8,
                finished_at = $9
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(ran)
        .bind(count_to_column(summary.candidates))
        .bind(count_to_column(summary.processed))
        .bind(count_to_column(summary.snapshotted))
        .bind(count_to_column(summary.secondary_changes))
        .bind(count_to_column(summary.errors))
        .bind(message)
        .bind(finished_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("crawl run update failed: {e}")))?;

        if updated.rows_affected() == 0 {
            return Err(SyncError::Persistence(format!(
                "crawl run {id} does not exist"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct CrawlRunRow {
    id: Uuid,
    job: String,
    batch_limit: i32,
    min_age_minutes: i32,
    sleep_ms: i64,
    ran: bool,
    candidates: i32,
    processed: i32,
    snapshotted: i32,
    secondary_changes: i32,
    errors: i32,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<CrawlRunRow> for CrawlRun {
    fn from(row: CrawlRunRow) -> Self {
        CrawlRun {
            id: RunId(row.id),
            job: row.job,
            limit: count_from_column(row.batch_limit),
            min_age_minutes: count_from_column(row.min_age_minutes),
            sleep_ms: row.sleep_ms.max(0) as u64,
            ran: row.ran,
            summary: RunSummary {
                candidates: count_from_column(row.candidates),
                processed: count_from_column(row.processed),
                snapshotted: count_from_column(row.snapshotted),
                secondary_changes: count_from_column(row.secondary_changes),
                errors: count_from_column(row.errors),
            },
            error_message: row.error_message,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

const RUN_COLUMNS: &str = "id, job, batch_limit, min_age_minutes, sleep_ms, ran, \
     candidates, processed, snapshotted, secondary_changes, errors, \
     error_message, started_at, finished_at";

#[async_trait]
impl CrawlRunRepository for PostgresCrawlRunRepository {
    async fn create(&self, run: &CrawlRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_runs
                (id, job, batch_limit, min_age_minutes, sleep_ms, ran, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(run.id.0)
        .bind(&run.job)
        .bind(count_to_column(run.limit))
        .bind(count_to_column(run.min_age_minutes))
        .bind(i64::try_from(run.sleep_ms).unwrap_or(i64::MAX))
        .bind(run.ran)
        .bind(run.started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("crawl run insert failed: {e}")))?;
        Ok(())
    }

    async fn finish(
        &self,
        id: RunId,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        self.complete(id, true, None, summary, finished_at).await
    }

    async fn fail(
        &self,
        id: RunId,
        message: &str,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        self.complete(id, false, Some(message), summary, finished_at)
            .await
    }

    async fn get(&self, id: RunId) -> Result<Option<CrawlRun>> {
        let row = sqlx::query_as::<_, CrawlRunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM crawl_runs WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("crawl run lookup failed: {e}")))?;

        Ok(row.map(CrawlRun::from))
    }

    async fn recent(&self, job: &str, limit: u32) -> Result<Vec<CrawlRun>> {
        let rows = sqlx::query_as::<_, CrawlRunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM crawl_runs WHERE job = $1 \
             ORDER BY started_at DESC LIMIT $2"
        ))
        .bind(job)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("crawl run listing failed: {e}")))?;

        Ok(rows.into_iter().map(CrawlRun::from).collect())
    }
}

#[derive(Clone, Debug)]
pub struct PostgresCrawlEventRepository {
    pool: PgPool,
}

impl PostgresCrawlEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CrawlEventRow {
    run_id: Uuid,
    level: String,
    event_type: String,
    subject_id: Option<String>,
    message: Option<String>,
    meta: Option<Json<Value>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CrawlEventRow> for CrawlEvent {
    type Error = SyncError;

    fn try_from(row: CrawlEventRow) -> Result<Self> {
        Ok(CrawlEvent {
            run_id: RunId(row.run_id),
            level: row.level.parse()?,
            event_type: row.event_type.parse()?,
            subject_id: row
                .subject_id
                .as_deref()
                .map(subject_from_column)
                .transpose()?,
            message: row.message,
            meta: row.meta.map(|meta| meta.0),
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CrawlEventRepository for PostgresCrawlEventRepository {
    async fn insert(&self, event: &CrawlEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_events
                (run_id, level, event_type, subject_id, message, meta, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.run_id.0)
        .bind(event.level.as_str())
        .bind(event.event_type.as_str())
        .bind(event.subject_id.as_ref().map(|s| s.as_str()))
        .bind(event.message.as_deref())
        .bind(event.meta.as_ref().map(Json))
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("crawl event insert failed: {e}")))?;
        Ok(())
    }

    async fn list_for_run(&self, run_id: RunId) -> Result<Vec<CrawlEvent>> {
        let rows = sqlx::query_as::<_, CrawlEventRow>(
            r#"
            SELECT run_id, level, event_type, subject_id, message, meta, created_at
            FROM crawl_events
            WHERE run_id = $1
            ORDER BY id
            "#,
        )
        .bind(run_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("crawl event listing failed: {e}")))?;

        rows.into_iter().map(CrawlEvent::try_from).collect()
    }
}
