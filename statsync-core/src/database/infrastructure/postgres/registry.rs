use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::database::ports::EntryRegistry;
use crate::error::{Result, SyncError};
use crate::types::{IdentityChange, RegistryEntry, SubjectId};

#[derive(Clone, Debug)]
pub struct PostgresEntryRegistry {
    pool: PgPool,
}

impl PostgresEntryRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntryRegistry for PostgresEntryRegistry {
    async fn list_entries(&self) -> Result<Vec<RegistryEntry>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT subject_id, display_name FROM registry_entries",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("registry listing failed: {e}")))?;

        // Rows are written by other parts of the application; skip anything
        // that isn't a usable id instead of failing the whole crawl.
        Ok(rows
            .into_iter()
            .filter_map(|(raw, name)| match SubjectId::parse(&raw) {
                Ok(id) => Some(RegistryEntry::new(id, name)),
                Err(err) => {
                    warn!(target: "crawl", subject = %raw, error = %err, "ignoring registry entry");
                    None
                }
            })
            .collect())
    }

    async fn record_identity_change(&self, change: &IdentityChange) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            SyncError::Persistence(format!("failed to start transaction: {e}"))
        })?;

        sqlx::query(
            r#"
            UPDATE registry_entries
            SET display_name = $2, updated_at = $3
            WHERE subject_id = $1
            "#,
        )
        .bind(change.subject_id.as_str())
        .bind(&change.current_name)
        .bind(change.observed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Persistence(format!("registry rename failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO registry_identity_history
                (subject_id, previous_name, current_name, observed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(change.subject_id.as_str())
        .bind(&change.previous_name)
        .bind(&change.current_name)
        .bind(change.observed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            SyncError::Persistence(format!("identity history insert failed: {e}"))
        })?;

        tx.commit().await.map_err(|e| {
            SyncError::Persistence(format!("identity change commit failed: {e}"))
        })
    }
}
