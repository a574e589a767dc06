use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{LeaderboardKey, LeaderboardSnapshot};

/// A key's current board is its newest row; refreshes insert, never update.
#[async_trait]
pub trait LeaderboardRepository: Send + Sync + fmt::Debug {
    async fn latest(
        &self,
        key: &LeaderboardKey,
    ) -> Result<Option<LeaderboardSnapshot>>;

    async fn insert(&self, snapshot: &LeaderboardSnapshot) -> Result<()>;
}
