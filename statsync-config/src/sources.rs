use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statsync_core::crawler::CrawlSettings;
use statsync_core::leaderboard::LeaderboardSettings;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub upstream: FileUpstreamConfig,
    #[serde(default)]
    pub rate_limit: FileRateLimitConfig,
    pub crawler: Option<CrawlSettings>,
    pub leaderboard: Option<LeaderboardSettings>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileUpstreamConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_base_url: Option<String>,
    /// Empty string disables the secondary cape probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_cape_template: Option<String>,
    /// Humantime string, e.g. `"10s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRateLimitConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<FileRateLimitPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<FileRateLimitPolicy>,
}

/// One `[rate_limit.*]` table. Durations are humantime strings.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRateLimitPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_margin: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub stats_base_url: Option<String>,
    pub stats_api_key: Option<String>,
    pub api_key_header: Option<String>,
    pub identity_base_url: Option<String>,
    pub secondary_cape_template: Option<String>,
    pub stats_max_tokens: Option<u32>,
    pub identity_max_tokens: Option<u32>,
    pub crawl_verbose: Option<bool>,
    pub scheduler_enabled: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the overrides from any variable source; `gather` reads the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let flag = |name: &str| var(name).and_then(|raw| parse_bool(&raw));

        Self {
            config_path: var("STATSYNC_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: parse_value(var("SERVER_PORT")),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_value(var("DATABASE_MAX_CONNECTIONS")),
            stats_base_url: var("STATS_BASE_URL"),
            stats_api_key: var("STATS_API_KEY"),
            api_key_header: var("STATS_API_KEY_HEADER"),
            identity_base_url: var("IDENTITY_BASE_URL"),
            secondary_cape_template: lookup("SECONDARY_CAPE_TEMPLATE"),
            stats_max_tokens: parse_value(var("STATS_RATE_LIMIT_MAX_TOKENS")),
            identity_max_tokens: parse_value(var("IDENTITY_RATE_LIMIT_MAX_TOKENS")),
            crawl_verbose: flag("CRAWL_VERBOSE"),
            scheduler_enabled: flag("SCHEDULER_ENABLED"),
        }
    }
}

fn parse_value<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|raw| raw.trim().parse().ok())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn blank_values_are_treated_as_unset() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STATS_API_KEY", "   "),
            ("SERVER_PORT", "8081"),
            ("SCHEDULER_ENABLED", "off"),
            ("CRAWL_VERBOSE", "maybe"),
        ]);
        let env = EnvConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(env.stats_api_key, None);
        assert_eq!(env.server_port, Some(8081));
        assert_eq!(env.scheduler_enabled, Some(false));
        assert_eq!(env.crawl_verbose, None);
    }

    #[test]
    fn partial_crawler_table_keeps_other_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            [crawler]
            default_limit = 10

            [rate_limit.stats]
            window = "5m"
            "#,
        )
        .unwrap();

        let crawler = file.crawler.unwrap();
        assert_eq!(crawler.default_limit, 10);
        assert_eq!(crawler.default_sleep_ms, CrawlSettings::default().default_sleep_ms);
        assert_eq!(
            file.rate_limit.stats.unwrap().window.as_deref(),
            Some("5m")
        );
    }
}
