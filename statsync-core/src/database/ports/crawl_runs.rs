use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{CrawlEvent, CrawlRun, RunId, RunSummary};

#[async_trait]
pub trait CrawlRunRepository: Send + Sync + fmt::Debug {
    async fn create(&self, run: &CrawlRun) -> Result<()>;

    /// Final update of a run that executed: `ran = true`.
    async fn finish(
        &self,
        id: RunId,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Final update of a run that did not complete: `ran = false` plus the
    /// reason shown to operators.
    async fn fail(
        &self,
        id: RunId,
        message: &str,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get(&self, id: RunId) -> Result<Option<CrawlRun>>;

    /// Most recent runs of `job`, newest first.
    async fn recent(&self, job: &str, limit: u32) -> Result<Vec<CrawlRun>>;
}

#[async_trait]
pub trait CrawlEventRepository: Send + Sync + fmt::Debug {
    async fn insert(&self, event: &CrawlEvent) -> Result<()>;

    /// Events of one run in emission order.
    async fn list_for_run(&self, run_id: RunId) -> Result<Vec<CrawlEvent>>;
}
