//! # Statsync Core
//!
//! Background synchronization of third-party game-profile data: player stats,
//! skins and capes, and leaderboards. Everything here is built to stay under
//! a strict provider rate limit and to avoid duplicate work when several
//! stateless instances share one database.
//!
//! ## Overview
//!
//! - **Rate limited upstream access**: [`upstream::RateLimitedClient`] keeps a
//!   fixed-window token budget and reconciles it against provider headers
//! - **Lock coordination**: [`locks::LockCoordinator`] offers TTL leases and
//!   Postgres advisory locks
//! - **Snapshot history**: [`snapshots::SnapshotStore`] appends raw payloads
//!   with derived projections and folds them into deduplicated texture history
//! - **Batch crawlers**: [`crawler::BatchCrawler`] picks the stalest subjects
//!   and processes them with paced delays, publishing typed events
//! - **Leaderboard cache**: [`leaderboard::LeaderboardCache`] serves ranked
//!   lists stale-while-revalidate with single-flight refreshes
//!
//! ## Feature Flags
//!
//! - `postgres` (default): sqlx-backed repositories, advisory locks and
//!   the embedded [`MIGRATOR`]
//! - `pg-tests`: Postgres integration tests (need `DATABASE_URL`)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod clock;
pub mod crawler;
pub mod database;
pub mod error;
pub mod leaderboard;
pub mod locks;
pub mod snapshots;
pub mod types;
pub mod upstream;

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::SyncStores;
pub use error::{Result, SyncError};

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
