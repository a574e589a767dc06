use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::database::ports::{CrawlEventRepository, CrawlRunRepository};
use crate::error::{Result, SyncError};
use crate::types::{CrawlEvent, CrawlRun, RunId, RunSummary};

#[derive(Debug, Default)]
pub struct MemoryCrawlRunRepository {
    runs: RwLock<Vec<CrawlRun>>,
}

impl MemoryCrawlRunRepository {
    fn update(
        &self,
        id: RunId,
        apply: impl FnOnce(&mut CrawlRun),
    ) -> Result<()> {
        let mut runs = self.runs.write();
        let run = runs.iter_mut().find(|run| run.id == id).ok_or_else(|| {
            SyncError::Persistence(format!("crawl run {id} does not exist"))
        })?;
        apply(run);
        Ok(())
    }
}

#[async_trait]
impl CrawlRunRepository for MemoryCrawlRunRepository {
    async fn create(&self, run: &CrawlRun) -> Result<()> {
        self.runs.write().push(run.clone());
        Ok(())
    }

    async fn finish(
        &self,
        id: RunId,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(id, |run| {
            run.ran = true;
            run.summary = *summary;
            run.error_message = None;
            run.finished_at = Some(finished_at);
        })
    }

    async fn fail(
        &self,
        id: RunId,
        message: &str,
        summary: &RunSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(id, |run| {
            run.ran = false;
            run.summary = *summary;
            run.error_message = Some(message.to_string());
            run.finished_at = Some(finished_at);
        })
    }

    async fn get(&self, id: RunId) -> Result<Option<CrawlRun>> {
        Ok(self.runs.read().iter().find(|run| run.id == id).cloned())
    }

    async fn recent(&self, job: &str, limit: u32) -> Result<Vec<CrawlRun>> {
        Ok(self
            .runs
            .read()
            .iter()
            .rev()
            .filter(|run| run.job == job)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCrawlEventRepository {
    events: RwLock<HashMap<RunId, Vec<CrawlEvent>>>,
}

#[async_trait]
impl CrawlEventRepository for MemoryCrawlEventRepository {
    async fn insert(&self, event: &CrawlEvent) -> Result<()> {
        self.events
            .write()
            .entry(event.run_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_for_run(&self, run_id: RunId) -> Result<Vec<CrawlEvent>> {
        Ok(self.events.read().get(&run_id).cloned().unwrap_or_default())
    }
}
