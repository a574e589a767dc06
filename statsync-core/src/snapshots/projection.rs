use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payloads projecting to fewer populated stat fields than this are treated
/// as unusable (the provider occasionally answers with an empty shell).
pub const DEFAULT_MIN_POPULATED_FIELDS: usize = 2;

/// Compact, derived view of a stats payload stored next to the raw one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatProjection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_exp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub karma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievement_points: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedwars_wins: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedwars_final_kills: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skywars_wins: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duels_wins: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_login: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

impl StatProjection {
    pub fn from_payload(payload: &Value) -> Self {
        let player = payload.get("player").unwrap_or(&Value::Null);
        let number = |pointer: &str| player.pointer(pointer).and_then(Value::as_f64);
        let millis = |pointer: &str| {
            player
                .pointer(pointer)
                .and_then(Value::as_i64)
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        };

        Self {
            display_name: player
                .get("displayname")
                .and_then(Value::as_str)
                .map(str::to_string),
            network_exp: number("/networkExp"),
            karma: number("/karma"),
            achievement_points: number("/achievementPoints"),
            bedwars_wins: number("/stats/Bedwars/wins_bedwars"),
            bedwars_final_kills: number("/stats/Bedwars/final_kills_bedwars"),
            skywars_wins: number("/stats/SkyWars/wins"),
            duels_wins: number("/stats/Duels/wins"),
            first_login: millis("/firstLogin"),
            last_login: millis("/lastLogin"),
        }
    }

    /// Number of stat fields carrying a value. The display name is identity,
    /// not a stat, and isn't counted.
    pub fn populated(&self) -> usize {
        [
            self.network_exp.is_some(),
            self.karma.is_some(),
            self.achievement_points.is_some(),
            self.bedwars_wins.is_some(),
            self.bedwars_final_kills.is_some(),
            self.skywars_wins.is_some(),
            self.duels_wins.is_some(),
            self.first_login.is_some(),
            self.last_login.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    pub fn is_usable(&self, min_populated: usize) -> bool {
        self.populated() >= min_populated
    }
}
