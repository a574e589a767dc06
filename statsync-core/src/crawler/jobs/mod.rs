mod identity;
mod stats;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

pub use identity::IdentityCrawlJob;
pub use stats::StatsCrawlJob;

use super::events::RunEmitter;
use crate::clock::Clock;
use crate::database::ports::EntryRegistry;
use crate::error::Result;
use crate::locks::AdvisoryKey;
use crate::snapshots::SnapshotStore;
use crate::types::{RegistryEntry, SnapshotKind};

/// Namespace half of the crawlers' advisory keys.
pub const CRAWL_LOCK_NAMESPACE: i32 = 0x5359_4e43;

/// What one processed item amounted to.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemOutcome {
    /// A snapshot was written. `summary` is safe to show on dashboards.
    Saved {
        summary: Value,
        secondary_change: bool,
    },
    /// Fetched fine but not worth a snapshot.
    Skipped { reason: String },
}

/// Collaborators a job may touch while processing one item.
#[derive(Clone, Copy, Debug)]
pub struct ItemContext<'a> {
    pub store: &'a SnapshotStore,
    pub registry: &'a dyn EntryRegistry,
    pub emitter: &'a RunEmitter,
    pub clock: &'a dyn Clock,
}

/// The part of a batch crawler that differs between instantiations: what
/// "fresh data" means for one subject.
#[async_trait]
pub trait CrawlJob: Send + Sync + fmt::Debug + 'static {
    fn name(&self) -> &'static str;

    fn advisory_key(&self) -> AdvisoryKey;

    fn snapshot_kind(&self) -> SnapshotKind;

    async fn process(
        &self,
        ctx: ItemContext<'_>,
        entry: &RegistryEntry,
    ) -> Result<ItemOutcome>;
}
