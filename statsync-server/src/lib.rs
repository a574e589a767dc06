//! # Statsync Server
//!
//! HTTP trigger surface for the statsync crawlers and leaderboard cache.
//!
//! ## Overview
//!
//! - **Crawl triggers**: run a batch and get its report, or stream the run's
//!   events as Server-Sent Events
//! - **Dashboards**: queue size and recent runs per crawler
//! - **Read access**: cached leaderboards and per-subject texture history
//! - **Scheduler**: both crawlers run periodically under the `autosync` lease
//!
//! Without a configured database the server runs on in-memory backends, which
//! is only safe for a single instance.

#![allow(missing_docs)]

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::{AppState, CrawlJobKind};
pub use routes::create_app;
