//! Staleness-driven batch crawlers.
//!
//! A run moves `STARTED -> SELECTING -> ITEM* -> FINISHED` under the job's
//! advisory lock. Items are processed strictly in ascending staleness order,
//! one at a time, with a fixed pause after each. Per-item failures are
//! counted and the loop moves on; persistence failures end the run.

mod engine;
mod events;
mod jobs;
mod recorder;
mod selection;
mod settings;

pub use engine::{ALREADY_RUNNING, BatchCrawler, CrawlerDeps, RunHandle};
pub use events::{CrawlEventBus, PublishedEvent, RunEmitter, run_events};
pub use jobs::{
    CRAWL_LOCK_NAMESPACE, CrawlJob, IdentityCrawlJob, ItemContext, ItemOutcome,
    StatsCrawlJob,
};
pub use recorder::CrawlEventRecorder;
pub use selection::{Candidate, select_candidates};
pub use settings::{CrawlRequest, CrawlSettings};

pub type StatsCrawler = BatchCrawler<StatsCrawlJob>;
pub type IdentityCrawler = BatchCrawler<IdentityCrawlJob>;
