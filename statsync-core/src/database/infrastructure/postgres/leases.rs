use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::database::ports::LeaseRepository;
use crate::error::{Result, SyncError};

#[derive(Clone, Debug)]
pub struct PostgresLeaseRepository {
    pool: PgPool,
}

impl PostgresLeaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseRepository for PostgresLeaseRepository {
    async fn try_acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<bool> {
        // Single statement: the conflict branch only fires for dead leases,
        // so two racing callers can't both see RETURNING rows.
        let acquired = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO sync_leases (key, locked_until)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET
                locked_until = EXCLUDED.locked_until
            WHERE sync_leases.locked_until <= $3
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(locked_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("lease acquire failed: {e}")))?;

        Ok(acquired.is_some())
    }

    async fn release(&self, key: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sync_leases SET locked_until = to_timestamp(0) WHERE key = $1",
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("lease release failed: {e}")))?;
        Ok(())
    }

    async fn locked_until(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar("SELECT locked_until FROM sync_leases WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Persistence(format!("lease lookup failed: {e}")))
    }
}
