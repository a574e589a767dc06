pub mod crawl;
pub mod ids;
pub mod leaderboard;
pub mod registry;
pub mod snapshot;

pub use crawl::{
    CrawlEvent, CrawlEventType, CrawlParams, CrawlRun, EventLevel,
    MAX_BATCH_LIMIT, MAX_SLEEP_MS, MIN_BATCH_LIMIT, RunReport, RunSummary,
};
pub use ids::{RunId, SnapshotId, SubjectId};
pub use leaderboard::{LeaderboardKey, LeaderboardRow, LeaderboardSnapshot};
pub use registry::{IdentityChange, RegistryEntry};
pub use snapshot::{
    Snapshot, SnapshotKind, TextureHistoryItem, TextureSet, TextureSlot,
};
