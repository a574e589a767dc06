use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardSettings {
    /// Boards younger than this are served without a refresh.
    pub freshness_secs: u64,
    /// Rows kept per board.
    pub max_rows: usize,
    /// Leading rows whose display name and value are looked up per refresh.
    pub max_resolve: usize,
    /// Revalidate hint for the provider's leaderboard listing.
    pub listing_revalidate_secs: u64,
    /// Concurrent background refreshes across all keys.
    pub background_concurrency: usize,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            freshness_secs: 4 * 60 * 60,
            max_rows: 25,
            max_resolve: 25,
            listing_revalidate_secs: 300,
            background_concurrency: 2,
        }
    }
}

impl LeaderboardSettings {
    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_secs.min(i64::MAX as u64) as i64)
    }

    pub fn listing_revalidate(&self) -> Duration {
        Duration::from_secs(self.listing_revalidate_secs)
    }
}
