//! sqlx adapters. Queries are checked at run time so the crate builds
//! without a live database.

mod advisory;
mod crawl_runs;
mod leaderboards;
mod leases;
mod registry;
mod snapshots;

pub use advisory::PostgresAdvisoryLocks;
pub use crawl_runs::{PostgresCrawlEventRepository, PostgresCrawlRunRepository};
pub use leaderboards::PostgresLeaderboardRepository;
pub use leases::PostgresLeaseRepository;
pub use registry::PostgresEntryRegistry;
pub use snapshots::PostgresSnapshotRepository;

use crate::error::SyncError;
use crate::types::SubjectId;

fn subject_from_column(raw: &str) -> Result<SubjectId, SyncError> {
    SubjectId::parse(raw).map_err(|_| {
        SyncError::Persistence(format!("stored subject id {raw:?} is malformed"))
    })
}

fn count_from_column(value: i32) -> u32 {
    value.max(0) as u32
}

fn count_to_column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
