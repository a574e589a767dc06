use thiserror::Error;

use crate::models::Config;

/// Provider ceilings the local budgets must stay under.
const STATS_PROVIDER_CEILING: u32 = 300;
const IDENTITY_PROVIDER_CEILING: u32 = 600;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("rate_limit.{upstream}.window must be longer than zero")]
    ZeroRateWindow { upstream: &'static str },
    #[error("leaderboard.max_rows must be at least 1")]
    EmptyLeaderboard,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.rate_limit.stats.window_secs == 0 {
        return Err(ConfigGuardRailError::ZeroRateWindow { upstream: "stats" });
    }
    if config.rate_limit.identity.window_secs == 0 {
        return Err(ConfigGuardRailError::ZeroRateWindow {
            upstream: "identity",
        });
    }
    if config.leaderboard.max_rows == 0 {
        return Err(ConfigGuardRailError::EmptyLeaderboard);
    }

    if config.upstream.stats_api_key.is_none() {
        warnings.push_with_hint(
            "STATS_API_KEY not configured; the stats provider will reject player and leaderboard requests",
            "Set STATS_API_KEY or upstream.stats_api_key",
        );
    }

    if config.database.url.is_none() {
        warnings.push_with_hint(
            "DATABASE_URL not configured; running on in-memory backends",
            "Locks only exclude callers inside this process; do not run more than one instance",
        );
    }

    if config.crawler.default_sleep_ms == 0 {
        warnings.push(
            "crawler.default_sleep_ms is 0; batches will spend their token budget in bursts",
        );
    }

    if config.rate_limit.stats.max_tokens > STATS_PROVIDER_CEILING {
        warnings.push_with_hint(
            format!(
                "rate_limit.stats.max_tokens ({}) exceeds the provider ceiling of {STATS_PROVIDER_CEILING}",
                config.rate_limit.stats.max_tokens
            ),
            "Keep the local budget below the documented ceiling to avoid 429 responses",
        );
    }
    if config.rate_limit.identity.max_tokens > IDENTITY_PROVIDER_CEILING {
        warnings.push_with_hint(
            format!(
                "rate_limit.identity.max_tokens ({}) exceeds the provider ceiling of {IDENTITY_PROVIDER_CEILING}",
                config.rate_limit.identity.max_tokens
            ),
            "Keep the local budget below the documented ceiling to avoid 429 responses",
        );
    }

    if config.leaderboard.max_resolve > config.leaderboard.max_rows {
        warnings.push(format!(
            "leaderboard.max_resolve ({}) is larger than max_rows ({}); only {} rows are resolved",
            config.leaderboard.max_resolve,
            config.leaderboard.max_rows,
            config.leaderboard.max_rows
        ));
    }

    Ok(warnings)
}
