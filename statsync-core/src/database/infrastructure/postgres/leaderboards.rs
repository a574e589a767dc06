use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::ports::LeaderboardRepository;
use crate::error::{Result, SyncError};
use crate::types::{LeaderboardKey, LeaderboardRow, LeaderboardSnapshot};

#[derive(Clone, Debug)]
pub struct PostgresLeaderboardRepository {
    pool: PgPool,
}

impl PostgresLeaderboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct LeaderboardSnapshotRow {
    id: Uuid,
    stat: String,
    scope: String,
    rows: Json<Vec<LeaderboardRow>>,
    fetched_at: DateTime<Utc>,
}

#[async_trait]
impl LeaderboardRepository for PostgresLeaderboardRepository {
    async fn latest(
        &self,
        key: &LeaderboardKey,
    ) -> Result<Option<LeaderboardSnapshot>> {
        let row = sqlx::query_as::<_, LeaderboardSnapshotRow>(
            r#"
            SELECT id, stat, scope, rows, fetched_at
            FROM leaderboard_snapshots
            WHERE stat = $1 AND scope = $2
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(&key.stat)
        .bind(&key.scope)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("leaderboard lookup failed: {e}")))?;

        Ok(row.map(|row| LeaderboardSnapshot {
            id: row.id,
            key: LeaderboardKey::new(row.stat, row.scope),
            rows: row.rows.0,
            fetched_at: row.fetched_at,
        }))
    }

    async fn insert(&self, snapshot: &LeaderboardSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leaderboard_snapshots (id, stat, scope, rows, fetched_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(snapshot.id)
        .bind(&snapshot.key.stat)
        .bind(&snapshot.key.scope)
        .bind(Json(&snapshot.rows))
        .bind(snapshot.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Persistence(format!("leaderboard insert failed: {e}")))?;
        Ok(())
    }
}
