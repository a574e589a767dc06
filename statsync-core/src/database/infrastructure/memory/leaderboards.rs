use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::database::ports::LeaderboardRepository;
use crate::error::Result;
use crate::types::{LeaderboardKey, LeaderboardSnapshot};

#[derive(Debug, Default)]
pub struct MemoryLeaderboardRepository {
    boards: RwLock<HashMap<LeaderboardKey, Vec<LeaderboardSnapshot>>>,
}

impl MemoryLeaderboardRepository {
    /// Number of rows stored for `key`, superseded ones included.
    pub fn snapshot_count(&self, key: &LeaderboardKey) -> usize {
        self.boards.read().get(key).map_or(0, Vec::len)
    }
}

#[async_trait]
impl LeaderboardRepository for MemoryLeaderboardRepository {
    async fn latest(
        &self,
        key: &LeaderboardKey,
    ) -> Result<Option<LeaderboardSnapshot>> {
        Ok(self.boards.read().get(key).and_then(|rows| {
            rows.iter().max_by_key(|snapshot| snapshot.fetched_at).cloned()
        }))
    }

    async fn insert(&self, snapshot: &LeaderboardSnapshot) -> Result<()> {
        self.boards
            .write()
            .entry(snapshot.key.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }
}
