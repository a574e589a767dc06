use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::events::{CrawlEventBus, RunEmitter, run_events};
use super::jobs::{CrawlJob, ItemContext, ItemOutcome};
use super::selection::select_candidates;
use super::settings::{CrawlRequest, CrawlSettings};
use crate::clock::Clock;
use crate::database::SyncStores;
use crate::database::ports::{CrawlRunRepository, EntryRegistry};
use crate::error::{Result, SyncError};
use crate::locks::{LockCoordinator, LockOutcome};
use crate::snapshots::SnapshotStore;
use crate::types::{
    CrawlEvent, CrawlEventType, CrawlParams, CrawlRun, EventLevel, RunId,
    RunReport, RunSummary,
};

pub const ALREADY_RUNNING: &str = "already running";

/// Shared collaborators of both crawler instantiations.
#[derive(Clone, Debug)]
pub struct CrawlerDeps {
    pub registry: Arc<dyn EntryRegistry>,
    pub store: SnapshotStore,
    pub runs: Arc<dyn CrawlRunRepository>,
    pub locks: LockCoordinator,
    pub bus: CrawlEventBus,
    pub clock: Arc<dyn Clock>,
}

impl CrawlerDeps {
    pub fn from_stores(
        stores: &SyncStores,
        bus: CrawlEventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: Arc::clone(&stores.registry),
            store: SnapshotStore::new(Arc::clone(&stores.snapshots), clock.clone()),
            runs: Arc::clone(&stores.runs),
            locks: LockCoordinator::new(
                Arc::clone(&stores.leases),
                Arc::clone(&stores.advisory),
                clock.clone(),
            ),
            bus,
            clock,
        }
    }
}

/// A run started with [`BatchCrawler::start`].
pub struct RunHandle {
    pub run_id: RunId,
    /// This run's events, ending with `run_finished` or with the run task.
    pub events: BoxStream<'static, CrawlEvent>,
    pub task: JoinHandle<Result<RunReport>>,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Loop counters plus the error that cut the loop short, if any.
struct Tally {
    summary: RunSummary,
    aborted_by: Option<SyncError>,
}

/// Staleness-driven batch crawler, generic over what one item fetches.
///
/// Every run is recorded in `crawl_runs`, including runs that found the
/// advisory lock taken, and always ends with a `run_finished` event.
#[derive(Debug)]
pub struct BatchCrawler<J: CrawlJob> {
    job: J,
    deps: CrawlerDeps,
    settings: CrawlSettings,
}

impl<J: CrawlJob> BatchCrawler<J> {
    pub fn new(job: J, deps: CrawlerDeps, settings: CrawlSettings) -> Self {
        Self {
            job,
            deps,
            settings,
        }
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    pub fn bus(&self) -> &CrawlEventBus {
        &self.deps.bus
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Runs one batch to completion. Observers receive events through the
    /// bus.
    pub async fn run_batch(&self, request: CrawlRequest) -> Result<RunReport> {
        let params = self.settings.params(&request);
        self.execute(RunId::new(), params).await
    }

    /// Spawns a batch and hands back a stream of its events. The
    /// subscription is taken before the task starts so nothing is missed.
    pub fn start(self: &Arc<Self>, request: CrawlRequest) -> RunHandle {
        let params = self.settings.params(&request);
        let run_id = RunId::new();
        let finished = CancellationToken::new();
        let events = run_events(self.deps.bus.subscribe(), run_id, finished.clone());

        let crawler = Arc::clone(self);
        let task = tokio::spawn(async move {
            // Cancels on every exit, panics included.
            let _finished = finished.drop_guard();
            crawler.execute(run_id, params).await
        });

        RunHandle {
            run_id,
            events,
            task,
        }
    }

    /// Number of subjects a run with `min_age_minutes` would consider,
    /// before the batch limit.
    pub async fn queue_size(&self, min_age_minutes: u32) -> Result<u32> {
        let entries = self.deps.registry.list_entries().await?;
        let latest = self
            .deps
            .store
            .latest_fetched_all(self.job.snapshot_kind())
            .await?;
        let cutoff = self.deps.clock.now()
            - chrono::Duration::minutes(i64::from(min_age_minutes));

        let due = select_candidates(entries, &latest, cutoff, None);
        Ok(u32::try_from(due.len()).unwrap_or(u32::MAX))
    }

    async fn execute(&self, run_id: RunId, params: CrawlParams) -> Result<RunReport> {
        let emitter = RunEmitter::new(
            self.deps.bus.clone(),
            self.deps.clock.clone(),
            run_id,
            self.job.name(),
            params.verbose,
        );

        let run = CrawlRun::started(run_id, self.job.name(), &params, self.deps.clock.now());
        if let Err(err) = self.deps.runs.create(&run).await {
            emitter.emit(
                EventLevel::Error,
                CrawlEventType::RunFinished,
                None,
                Some(err.to_string()),
                None,
            );
            return Err(err);
        }

        let outcome = self
            .deps
            .locks
            .with_advisory_lock(self.job.advisory_key(), || {
                self.crawl(&emitter, &params)
            })
            .await;

        let report = match outcome {
            Ok(LockOutcome::Ran(Tally {
                summary,
                aborted_by: None,
            })) => RunReport {
                run_id,
                ran: true,
                summary: Some(summary),
                error: None,
            },
            Ok(LockOutcome::Ran(Tally {
                summary,
                aborted_by: Some(err),
            })) => RunReport {
                run_id,
                ran: false,
                summary: Some(summary),
                error: Some(err.to_string()),
            },
            Ok(LockOutcome::Skipped) => RunReport {
                run_id,
                ran: false,
                summary: None,
                error: Some(ALREADY_RUNNING.to_string()),
            },
            Err(err) => RunReport {
                run_id,
                ran: false,
                summary: None,
                error: Some(err.to_string()),
            },
        };

        self.finalize(&emitter, &report).await?;
        Ok(report)
    }

    async fn finalize(&self, emitter: &RunEmitter, report: &RunReport) -> Result<()> {
        let now = self.deps.clock.now();
        let summary = report.summary.unwrap_or_default();

        let persisted = match &report.error {
            None => self.deps.runs.finish(report.run_id, &summary, now).await,
            Some(message) => {
                self.deps
                    .runs
                    .fail(report.run_id, message, &summary, now)
                    .await
            }
        };

        let level = match report.error.as_deref() {
            None => EventLevel::Info,
            Some(ALREADY_RUNNING) => EventLevel::Warn,
            Some(_) => EventLevel::Error,
        };
        let message = report.error.clone().unwrap_or_else(|| {
            format!(
                "{} of {} candidates snapshotted, {} errors",
                summary.snapshotted, summary.candidates, summary.errors
            )
        });
        emitter.emit(
            level,
            CrawlEventType::RunFinished,
            None,
            Some(message),
            Some(json!({ "ran": report.ran, "summary": summary })),
        );

        if let Err(err) = &persisted {
            error!(target: "crawl", run_id = %report.run_id, error = %err, "failed to finalize crawl run");
        }
        persisted
    }

    async fn crawl(&self, emitter: &RunEmitter, params: &CrawlParams) -> Result<Tally> {
        let job = self.job.name();
        emitter.info(
            CrawlEventType::RunStarted,
            None,
            Some(format!("{job} crawl started")),
            Some(json!(params)),
        );

        let entries = self.deps.registry.list_entries().await?;
        let latest = self
            .deps
            .store
            .latest_fetched_all(self.job.snapshot_kind())
            .await?;
        let cutoff = self.deps.clock.now()
            - chrono::Duration::minutes(i64::from(params.min_age_minutes));
        let candidates =
            select_candidates(entries, &latest, cutoff, Some(params.limit as usize));

        let mut summary = RunSummary {
            candidates: candidates.len() as u32,
            ..RunSummary::default()
        };
        info!(target: "crawl", job, candidates = summary.candidates, "candidates selected");

        let ctx = ItemContext {
            store: &self.deps.store,
            registry: self.deps.registry.as_ref(),
            emitter,
            clock: self.deps.clock.as_ref(),
        };
        let pause = Duration::from_millis(params.sleep_ms);

        for candidate in candidates {
            let subject = &candidate.entry.subject_id;
            emitter.info(
                CrawlEventType::ItemStarted,
                Some(subject),
                None,
                Some(json!({
                    "display_name": candidate.entry.display_name,
                    "last_fetched_at": candidate.latest_fetched_at,
                })),
            );

            summary.processed += 1;
            match self.job.process(ctx, &candidate.entry).await {
                Ok(ItemOutcome::Saved {
                    summary: item_summary,
                    secondary_change,
                }) => {
                    summary.snapshotted += 1;
                    if secondary_change {
                        summary.secondary_changes += 1;
                    }
                    emitter.info(
                        CrawlEventType::ItemSaved,
                        Some(subject),
                        None,
                        Some(item_summary),
                    );
                }
                Ok(ItemOutcome::Skipped { reason }) => {
                    emitter.emit(
                        EventLevel::Warn,
                        CrawlEventType::ItemError,
                        Some(subject),
                        Some(reason),
                        Some(json!({ "skipped": true })),
                    );
                }
                Err(err) if err.is_persistence() => {
                    summary.errors += 1;
                    emitter.emit(
                        EventLevel::Error,
                        CrawlEventType::ItemError,
                        Some(subject),
                        Some(err.to_string()),
                        None,
                    );
                    return Ok(Tally {
                        summary,
                        aborted_by: Some(err),
                    });
                }
                Err(err) => {
                    summary.errors += 1;
                    emitter.emit(
                        EventLevel::Error,
                        CrawlEventType::ItemError,
                        Some(subject),
                        Some(err.to_string()),
                        err.upstream_status().map(|status| json!({ "status": status })),
                    );
                }
            }

            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        Ok(Tally {
            summary,
            aborted_by: None,
        })
    }
}
