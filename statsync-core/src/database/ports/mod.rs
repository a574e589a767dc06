//! Repository ports. Postgres adapters live in `infrastructure::postgres`,
//! in-process ones in `infrastructure::memory`.

pub mod crawl_runs;
pub mod leaderboards;
pub mod leases;
pub mod registry;
pub mod snapshots;

pub use crawl_runs::{CrawlEventRepository, CrawlRunRepository};
pub use leaderboards::LeaderboardRepository;
pub use leases::LeaseRepository;
pub use registry::EntryRegistry;
pub use snapshots::SnapshotRepository;
