use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use statsync_core::{
    crawler::{CrawlEventRecorder, CrawlRequest},
    types::RunReport,
};

use crate::infra::app_state::AppState;

/// Lease shared by every instance's scheduler.
pub const AUTOSYNC_LEASE: &str = "autosync";

const RECORDER_GRACE: Duration = Duration::from_secs(5);

/// Background tasks owned by a running server.
#[derive(Debug)]
pub struct BackgroundTasks {
    shutdown: CancellationToken,
    scheduler: Option<JoinHandle<()>>,
    recorder: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Starts the event recorder and, when enabled, the scheduler.
    pub fn spawn(state: &AppState) -> Self {
        Self::start(state, state.crawl_settings.scheduler_enabled)
    }

    /// Event persistence without the scheduler, for one-shot CLI runs.
    pub fn recorder_only(state: &AppState) -> Self {
        Self::start(state, false)
    }

    fn start(state: &AppState, with_scheduler: bool) -> Self {
        let shutdown = CancellationToken::new();
        let recorder =
            CrawlEventRecorder::spawn(&state.bus, Arc::clone(&state.stores.events));

        let scheduler = if with_scheduler {
            Some(tokio::spawn(run_scheduler(state.clone(), shutdown.clone())))
        } else {
            info!("scheduler disabled");
            None
        };

        Self {
            shutdown,
            scheduler,
            recorder,
        }
    }

    /// Stops the scheduler after its current tick, waits for background
    /// leaderboard refreshes, then lets the recorder persist what is still
    /// buffered. Takes the last handle on `state` so the event bus can close.
    /// In-flight crawl runs are not interrupted.
    pub async fn shutdown(self, state: AppState) {
        self.shutdown.cancel();
        if let Some(scheduler) = self.scheduler
            && let Err(err) = scheduler.await
        {
            warn!(error = %err, "scheduler task ended abnormally");
        }

        state.leaderboards.drain().await;
        drop(state);

        let mut recorder = self.recorder;
        if tokio::time::timeout(RECORDER_GRACE, &mut recorder).await.is_err() {
            // Streaming runs still hold the bus open.
            warn!("event recorder still busy after shutdown grace, abandoning it");
            recorder.abort();
        }
        info!("background tasks stopped");
    }
}

async fn run_scheduler(state: AppState, shutdown: CancellationToken) {
    let period = Duration::from_secs(state.crawl_settings.scheduler_interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = period.as_secs(), "scheduler started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => run_scheduled_sync(&state).await,
        }
    }
}

/// One scheduler tick: both crawlers back to back under the autosync lease.
/// Contention with another instance is expected and only logged.
pub async fn run_scheduled_sync(state: &AppState) {
    let ttl = Duration::from_secs(state.crawl_settings.scheduler_lease_ttl_secs);

    let outcome = state
        .locks
        .with_lease(AUTOSYNC_LEASE, ttl, || async {
            let stats = state
                .stats_crawler
                .run_batch(CrawlRequest::default())
                .await?;
            let identity = state
                .identity_crawler
                .run_batch(CrawlRequest::default())
                .await?;
            Ok((stats, identity))
        })
        .await;

    match outcome {
        Ok((stats, identity)) => {
            log_report("stats", &stats);
            log_report("identity", &identity);
        }
        Err(err) if err.is_already_locked() => {
            info!(target: "crawl", lease = AUTOSYNC_LEASE, "autosync lease held elsewhere, skipping tick");
        }
        Err(err) => {
            error!(target: "crawl", error = %err, "scheduled sync failed");
        }
    }
}

fn log_report(job: &str, report: &RunReport) {
    let summary = report.summary.unwrap_or_default();
    match &report.error {
        None => info!(
            target: "crawl",
            job,
            run_id = %report.run_id,
            candidates = summary.candidates,
            snapshotted = summary.snapshotted,
            errors = summary.errors,
            "scheduled run finished"
        ),
        Some(message) => warn!(
            target: "crawl",
            job,
            run_id = %report.run_id,
            ran = report.ran,
            error = %message,
            "scheduled run did not complete"
        ),
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
