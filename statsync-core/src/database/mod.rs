pub mod infrastructure;
pub mod ports;

use std::sync::Arc;

use crate::locks::AdvisoryLocks;
use ports::{
    CrawlEventRepository, CrawlRunRepository, EntryRegistry,
    LeaderboardRepository, LeaseRepository, SnapshotRepository,
};

#[cfg(feature = "postgres")]
use crate::error::{Result, SyncError};
#[cfg(feature = "postgres")]
use sqlx::{PgPool, postgres::PgPoolOptions};
#[cfg(feature = "postgres")]
use tracing::info;

/// Every persistence port the sync components need, bundled so callers wire
/// one backend in one place.
#[derive(Clone, Debug)]
pub struct SyncStores {
    pub leases: Arc<dyn LeaseRepository>,
    pub advisory: Arc<dyn AdvisoryLocks>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub runs: Arc<dyn CrawlRunRepository>,
    pub events: Arc<dyn CrawlEventRepository>,
    pub leaderboards: Arc<dyn LeaderboardRepository>,
    pub registry: Arc<dyn EntryRegistry>,
}

impl SyncStores {
    /// Process-local backends. Locks only exclude callers inside this process.
    pub fn in_memory() -> Self {
        Self::in_memory_with_registry(Arc::new(
            infrastructure::memory::MemoryEntryRegistry::default(),
        ))
    }

    pub fn in_memory_with_registry(registry: Arc<dyn EntryRegistry>) -> Self {
        use infrastructure::memory::*;

        Self {
            leases: Arc::new(MemoryLeaseRepository::default()),
            advisory: Arc::new(MemoryAdvisoryLocks::default()),
            snapshots: Arc::new(MemorySnapshotRepository::default()),
            runs: Arc::new(MemoryCrawlRunRepository::default()),
            events: Arc::new(MemoryCrawlEventRepository::default()),
            leaderboards: Arc::new(MemoryLeaderboardRepository::default()),
            registry,
        }
    }

    #[cfg(feature = "postgres")]
    pub fn postgres(pool: PgPool) -> Self {
        use infrastructure::postgres::*;

        Self {
            leases: Arc::new(PostgresLeaseRepository::new(pool.clone())),
            advisory: Arc::new(PostgresAdvisoryLocks::new(pool.clone())),
            snapshots: Arc::new(PostgresSnapshotRepository::new(pool.clone())),
            runs: Arc::new(PostgresCrawlRunRepository::new(pool.clone())),
            events: Arc::new(PostgresCrawlEventRepository::new(pool.clone())),
            leaderboards: Arc::new(PostgresLeaderboardRepository::new(
                pool.clone(),
            )),
            registry: Arc::new(PostgresEntryRegistry::new(pool)),
        }
    }
}

/// Opens the shared pool. Advisory locks pin one connection per held lock,
/// so `max_connections` must leave room for them next to regular queries.
#[cfg(feature = "postgres")]
pub async fn connect(
    connection_string: &str,
    max_connections: u32,
) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(2))
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(600))
        .test_before_acquire(true)
        .connect(connection_string)
        .await
        .map_err(|e| {
            SyncError::Persistence(format!("Database connection failed: {e}"))
        })?;

    info!(max_connections, "Database pool initialized");
    Ok(pool)
}

#[cfg(feature = "postgres")]
pub async fn migrate(pool: &PgPool) -> Result<()> {
    crate::MIGRATOR.run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}
