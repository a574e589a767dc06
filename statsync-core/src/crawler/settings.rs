use serde::{Deserialize, Serialize};

use crate::snapshots::DEFAULT_MIN_POPULATED_FIELDS;
use crate::types::CrawlParams;

/// Defaults applied when a trigger leaves a knob unset, plus scheduler and
/// event bus tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub default_limit: u32,
    pub default_min_age_minutes: u32,
    pub default_sleep_ms: u64,
    /// Persist events of scheduled runs, not only stream them.
    pub verbose: bool,
    /// Stats payloads projecting to fewer populated fields are skipped.
    pub min_populated_fields: usize,
    pub scheduler_enabled: bool,
    pub scheduler_interval_secs: u64,
    pub scheduler_lease_ttl_secs: u64,
    pub event_bus_capacity: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            default_limit: 50,
            default_min_age_minutes: 360,
            default_sleep_ms: 1_200,
            verbose: false,
            min_populated_fields: DEFAULT_MIN_POPULATED_FIELDS,
            scheduler_enabled: true,
            scheduler_interval_secs: 900,
            scheduler_lease_ttl_secs: 1_800,
            event_bus_capacity: 1_024,
        }
    }
}

/// Knobs of one trigger; unset fields fall back to [`CrawlSettings`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlRequest {
    pub limit: Option<u32>,
    pub min_age_minutes: Option<u32>,
    pub sleep_ms: Option<u64>,
    pub verbose: Option<bool>,
}

impl CrawlSettings {
    pub fn params(&self, request: &CrawlRequest) -> CrawlParams {
        CrawlParams::new(
            request.limit.unwrap_or(self.default_limit),
            request
                .min_age_minutes
                .unwrap_or(self.default_min_age_minutes),
            request.sleep_ms.unwrap_or(self.default_sleep_ms),
            request.verbose.unwrap_or(self.verbose),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_overrides_defaults_and_is_clamped() {
        let settings = CrawlSettings::default();

        let defaults = settings.params(&CrawlRequest::default());
        assert_eq!(defaults.limit, 50);
        assert_eq!(defaults.sleep_ms, 1_200);

        let custom = settings.params(&CrawlRequest {
            limit: Some(999),
            sleep_ms: Some(0),
            verbose: Some(true),
            ..CrawlRequest::default()
        });
        assert_eq!(custom.limit, 250);
        assert_eq!(custom.sleep_ms, 0);
        assert!(custom.verbose);
    }

    #[test]
    fn partial_toml_like_input_keeps_defaults() {
        let settings: CrawlSettings =
            serde_json::from_str(r#"{"default_limit": 10}"#).unwrap();
        assert_eq!(settings.default_limit, 10);
        assert_eq!(settings.min_populated_fields, 2);
    }
}
