use std::path::PathBuf;
use std::time::Duration;

use statsync_core::crawler::CrawlSettings;
use statsync_core::leaderboard::LeaderboardSettings;
use statsync_core::upstream::RateLimitPolicy;
use url::Url;

pub const DEFAULT_STATS_BASE_URL: &str = "https://api.hypixel.net";
pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://sessionserver.mojang.com";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Fully resolved configuration: file values overlaid by the environment,
/// defaults filled in.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub rate_limit: RateLimitConfig,
    pub crawler: CrawlSettings,
    pub leaderboard: LeaderboardSettings,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` runs on in-memory backends.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct UpstreamConfig {
    pub stats_base_url: Url,
    pub stats_api_key: Option<String>,
    pub api_key_header: String,
    pub identity_base_url: Url,
    /// `{name}` is replaced by the player name. `None` disables the probe.
    pub secondary_cape_template: Option<String>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("stats_base_url", &self.stats_base_url.as_str())
            .field(
                "stats_api_key",
                &self.stats_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("api_key_header", &self.api_key_header)
            .field("identity_base_url", &self.identity_base_url.as_str())
            .field("secondary_cape_template", &self.secondary_cape_template)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub stats: RateLimitPolicy,
    pub identity: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            stats: RateLimitPolicy::stats_default(),
            identity: RateLimitPolicy::identity_default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
