use axum::response::sse::{Event, KeepAlive};
use axum::{
    extract::{Path, Query, State},
    response::{Json, Sse},
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, time::Duration};
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use statsync_core::{
    crawler::CrawlRequest,
    types::{CrawlEvent, CrawlRun, RunReport},
};

use crate::infra::{
    app_state::{AppState, CrawlJobKind},
    errors::AppResult,
};

const DEFAULT_RUNS_LIMIT: u32 = 20;
const MAX_RUNS_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub min_age_minutes: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub job: &'static str,
    pub min_age_minutes: u32,
    pub queue_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub runs: Vec<CrawlRun>,
    pub count: usize,
}

/// Runs one batch and answers with its report. Lock contention is a normal
/// answer (`ran: false`, `error: "already running"`), not an HTTP error.
pub async fn run_crawl_handler(
    State(state): State<AppState>,
    Path(job): Path<String>,
    request: Option<Json<CrawlRequest>>,
) -> AppResult<Json<RunReport>> {
    let job: CrawlJobKind = job.parse()?;
    let request = request.map(|Json(request)| request).unwrap_or_default();
    info!(target: "crawl", %job, ?request, "manual crawl requested");

    let report = state.run_crawl(job, request).await?;
    Ok(Json(report))
}

/// Starts a batch and streams its events as SSE. Each event is named after
/// its type; the stream ends after `run_finished`. A client disconnect does
/// not cancel the run.
pub async fn stream_crawl_handler(
    State(state): State<AppState>,
    Path(job): Path<String>,
    Query(request): Query<CrawlRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job: CrawlJobKind = job.parse()?;
    let handle = state.start_crawl(job, request);
    info!(target: "crawl", %job, run_id = %handle.run_id, "streaming crawl started");

    let stream = handle
        .events
        .filter_map(|event| crawl_event_to_sse(&event).map(Ok));

    Ok(Sse::new(stream).keep_alive(default_keep_alive()))
}

pub async fn queue_size_handler(
    State(state): State<AppState>,
    Path(job): Path<String>,
    Query(query): Query<QueueQuery>,
) -> AppResult<Json<QueueResponse>> {
    let job: CrawlJobKind = job.parse()?;
    let min_age_minutes = query
        .min_age_minutes
        .unwrap_or(state.crawl_settings.default_min_age_minutes);

    let queue_size = state.queue_size(job, min_age_minutes).await?;
    Ok(Json(QueueResponse {
        job: job.as_str(),
        min_age_minutes,
        queue_size,
    }))
}

pub async fn recent_runs_handler(
    State(state): State<AppState>,
    Path(job): Path<String>,
    Query(query): Query<RunsQuery>,
) -> AppResult<Json<RunsResponse>> {
    let job: CrawlJobKind = job.parse()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUNS_LIMIT)
        .clamp(1, MAX_RUNS_LIMIT);

    let runs = state.stores.runs.recent(job.as_str(), limit).await?;
    let count = runs.len();
    Ok(Json(RunsResponse { runs, count }))
}

fn crawl_event_to_sse(event: &CrawlEvent) -> Option<Event> {
    serde_json::to_string(event)
        .map(|data| Event::default().event(event.event_type.as_str()).data(data))
        .map_err(|err| {
            warn!(target: "crawl", run_id = %event.run_id, "failed to encode crawl event: {err}");
            err
        })
        .ok()
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
