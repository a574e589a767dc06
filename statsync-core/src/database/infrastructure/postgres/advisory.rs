use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::locks::{AdvisoryGuard, AdvisoryHold, AdvisoryKey, AdvisoryLocks};

/// `pg_try_advisory_lock` on a dedicated pooled connection. The lock lives as
/// long as that session, so the connection travels with the guard.
#[derive(Clone, Debug)]
pub struct PostgresAdvisoryLocks {
    pool: PgPool,
}

impl PostgresAdvisoryLocks {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdvisoryLocks for PostgresAdvisoryLocks {
    async fn try_acquire(&self, key: AdvisoryKey) -> Result<Option<AdvisoryGuard>> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            SyncError::Persistence(format!("advisory lock connection failed: {e}"))
        })?;

        let acquired: bool =
            sqlx::query_scalar("SELECT pg_try_advisory_lock($1, $2)")
                .bind(key.key1)
                .bind(key.key2)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| {
                    SyncError::Persistence(format!("pg_try_advisory_lock failed: {e}"))
                })?;

        if !acquired {
            return Ok(None);
        }

        Ok(Some(AdvisoryGuard::new(
            key,
            PgAdvisoryHold {
                key,
                conn: Some(conn),
            },
        )))
    }
}

struct PgAdvisoryHold {
    key: AdvisoryKey,
    conn: Option<PoolConnection<Postgres>>,
}

#[async_trait]
impl AdvisoryHold for PgAdvisoryHold {
    async fn release(mut self: Box<Self>) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked = sqlx::query_scalar::<_, bool>(
            "SELECT pg_advisory_unlock($1, $2)",
        )
        .bind(self.key.key1)
        .bind(self.key.key2)
        .fetch_one(&mut *conn)
        .await;

        match unlocked {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(target: "locks", key = %self.key, "advisory lock was not held by this session");
                Ok(())
            }
            Err(e) => {
                // Never hand a session that may still own the lock back to
                // the pool; closing it frees the lock server-side.
                drop(conn.detach());
                Err(SyncError::Persistence(format!(
                    "pg_advisory_unlock failed: {e}"
                )))
            }
        }
    }
}

impl Drop for PgAdvisoryHold {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(target: "locks", key = %self.key, "advisory guard dropped without release, closing its session");
            drop(conn.detach());
        }
    }
}
