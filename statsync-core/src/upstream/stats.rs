use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::client::RateLimitedClient;
use crate::error::{Result, SyncError};
use crate::types::{LeaderboardKey, SubjectId};

/// Game-stats provider as seen by the crawler and the leaderboard cache.
#[async_trait]
pub trait StatsApi: Send + Sync + fmt::Debug {
    /// Full player payload for `subject`.
    async fn player(&self, subject: &SubjectId) -> Result<Value>;

    /// Ranked leader ids for `key`, best first. Empty when the provider has no
    /// such board.
    async fn leaders(
        &self,
        key: &LeaderboardKey,
        revalidate: Option<Duration>,
    ) -> Result<Vec<SubjectId>>;
}

#[derive(Debug, Clone)]
pub struct HypixelStatsApi {
    client: Arc<RateLimitedClient>,
}

impl HypixelStatsApi {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<RateLimitedClient> {
        &self.client
    }
}

#[async_trait]
impl StatsApi for HypixelStatsApi {
    async fn player(&self, subject: &SubjectId) -> Result<Value> {
        let payload = self
            .client
            .fetch_json(&format!("/v2/player?uuid={subject}"), None)
            .await?;

        if payload.get("player").is_none_or(Value::is_null) {
            return Err(SyncError::upstream(
                404,
                format!("no player payload for {subject}"),
            ));
        }

        Ok(payload)
    }

    async fn leaders(
        &self,
        key: &LeaderboardKey,
        revalidate: Option<Duration>,
    ) -> Result<Vec<SubjectId>> {
        let payload = self.client.fetch_json("/v2/leaderboards", revalidate).await?;
        Ok(leaders_from_listing(&payload, key))
    }
}

/// Finds the board for `key` in a leaderboard listing. Scope matching is
/// case-insensitive; malformed ids are dropped with a warning.
pub fn leaders_from_listing(
    payload: &Value,
    key: &LeaderboardKey,
) -> Vec<SubjectId> {
    let Some(boards) = payload.get("leaderboards").and_then(Value::as_object)
    else {
        return Vec::new();
    };

    let Some(board) = boards
        .iter()
        .find(|(scope, _)| scope.eq_ignore_ascii_case(&key.scope))
        .and_then(|(_, boards)| boards.as_array())
        .and_then(|boards| {
            boards.iter().find(|board| {
                board.get("path").and_then(Value::as_str)
                    == Some(key.stat.as_str())
            })
        })
    else {
        return Vec::new();
    };

    board
        .get("leaders")
        .and_then(Value::as_array)
        .map(|leaders| {
            leaders
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|raw| match SubjectId::parse(raw) {
                    Ok(id) => Some(id),
                    Err(err) => {
                        warn!(target: "leaderboard", board = %key, error = %err, "skipping malformed leader id");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `player.displayname` of a player payload.
pub fn display_name(payload: &Value) -> Option<&str> {
    payload
        .pointer("/player/displayname")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

/// Numeric value of `stat` for `scope` in a player payload. Looks in
/// `player.stats.<scope>` first (scope compared case-insensitively), then at
/// the top level of `player` for network-wide stats.
pub fn stat_value(payload: &Value, scope: &str, stat: &str) -> Option<f64> {
    let player = payload.get("player")?;

    let scoped = player
        .get("stats")
        .and_then(Value::as_object)
        .and_then(|stats| {
            stats
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(scope))
                .map(|(_, value)| value)
        })
        .and_then(|scope_stats| scope_stats.get(stat))
        .and_then(Value::as_f64);

    scoped.or_else(|| player.get(stat).and_then(Value::as_f64))
}
