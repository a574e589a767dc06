use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{RunId, SubjectId};
use crate::error::SyncError;

pub const MIN_BATCH_LIMIT: u32 = 1;
pub const MAX_BATCH_LIMIT: u32 = 250;
pub const MAX_SLEEP_MS: u64 = 5_000;

/// Effective knobs of one batch invocation, already clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlParams {
    pub limit: u32,
    pub min_age_minutes: u32,
    pub sleep_ms: u64,
    /// Persist every emitted event, not just stream it.
    pub verbose: bool,
}

impl CrawlParams {
    pub fn new(
        limit: u32,
        min_age_minutes: u32,
        sleep_ms: u64,
        verbose: bool,
    ) -> Self {
        Self {
            limit: limit.clamp(MIN_BATCH_LIMIT, MAX_BATCH_LIMIT),
            min_age_minutes,
            sleep_ms: sleep_ms.min(MAX_SLEEP_MS),
            verbose,
        }
    }
}

/// Final counters of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub candidates: u32,
    pub processed: u32,
    pub snapshotted: u32,
    /// Identity changes for the identity crawler, always 0 for stats.
    pub secondary_changes: u32,
    pub errors: u32,
}

/// Persisted record of one batch invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrawlRun {
    pub id: RunId,
    pub job: String,
    pub limit: u32,
    pub min_age_minutes: u32,
    pub sleep_ms: u64,
    pub ran: bool,
    #[serde(flatten)]
    pub summary: RunSummary,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlRun {
    pub fn started(
        id: RunId,
        job: impl Into<String>,
        params: &CrawlParams,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job: job.into(),
            limit: params.limit,
            min_age_minutes: params.min_age_minutes,
            sleep_ms: params.sleep_ms,
            ran: false,
            summary: RunSummary::default(),
            error_message: None,
            started_at,
            finished_at: None,
        }
    }
}

/// What a trigger surface gets back from `run_batch`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub ran: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

impl FromStr for EventLevel {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(SyncError::Internal(format!(
                "unknown event level {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlEventType {
    RunStarted,
    ItemStarted,
    ItemChanged,
    ItemSaved,
    ItemError,
    RunFinished,
}

impl CrawlEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlEventType::RunStarted => "run_started",
            CrawlEventType::ItemStarted => "item_started",
            CrawlEventType::ItemChanged => "item_changed",
            CrawlEventType::ItemSaved => "item_saved",
            CrawlEventType::ItemError => "item_error",
            CrawlEventType::RunFinished => "run_finished",
        }
    }
}

impl fmt::Display for CrawlEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlEventType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run_started" => Ok(Self::RunStarted),
            "item_started" => Ok(Self::ItemStarted),
            "item_changed" => Ok(Self::ItemChanged),
            "item_saved" => Ok(Self::ItemSaved),
            "item_error" => Ok(Self::ItemError),
            "run_finished" => Ok(Self::RunFinished),
            other => Err(SyncError::Internal(format!(
                "unknown crawl event type {other}"
            ))),
        }
    }
}

/// Per-item telemetry emitted while a run progresses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrawlEvent {
    pub run_id: RunId,
    pub level: EventLevel,
    pub event_type: CrawlEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<SubjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl CrawlEvent {
    pub fn is_terminal(&self) -> bool {
        self.event_type == CrawlEventType::RunFinished
    }
}
