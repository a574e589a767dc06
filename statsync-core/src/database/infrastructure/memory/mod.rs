//! In-process backends. They back the test suite and single-instance runs
//! without a database; advisory locks are then only process-wide.

mod advisory;
mod crawl_runs;
mod leaderboards;
mod leases;
mod registry;
mod snapshots;

pub use advisory::MemoryAdvisoryLocks;
pub use crawl_runs::{MemoryCrawlEventRepository, MemoryCrawlRunRepository};
pub use leaderboards::MemoryLeaderboardRepository;
pub use leases::MemoryLeaseRepository;
pub use registry::MemoryEntryRegistry;
pub use snapshots::MemorySnapshotRepository;
