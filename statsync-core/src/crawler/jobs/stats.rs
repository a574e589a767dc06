use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{CRAWL_LOCK_NAMESPACE, CrawlJob, ItemContext, ItemOutcome};
use crate::error::Result;
use crate::locks::AdvisoryKey;
use crate::snapshots::StatProjection;
use crate::types::{RegistryEntry, SnapshotKind};
use crate::upstream::StatsApi;

/// Pulls the player stats payload and stores it with its [`StatProjection`].
#[derive(Debug, Clone)]
pub struct StatsCrawlJob {
    api: Arc<dyn StatsApi>,
    min_populated_fields: usize,
}

impl StatsCrawlJob {
    pub const NAME: &'static str = "stats";

    pub fn new(api: Arc<dyn StatsApi>, min_populated_fields: usize) -> Self {
        Self {
            api,
            min_populated_fields,
        }
    }
}

#[async_trait]
impl CrawlJob for StatsCrawlJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn advisory_key(&self) -> AdvisoryKey {
        AdvisoryKey::new(CRAWL_LOCK_NAMESPACE, 1)
    }

    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::Stats
    }

    async fn process(
        &self,
        ctx: ItemContext<'_>,
        entry: &RegistryEntry,
    ) -> Result<ItemOutcome> {
        let payload = self.api.player(&entry.subject_id).await?;
        let projection = StatProjection::from_payload(&payload);

        if !projection.is_usable(self.min_populated_fields) {
            return Ok(ItemOutcome::Skipped {
                reason: format!(
                    "payload has {} populated stat fields, {} required",
                    projection.populated(),
                    self.min_populated_fields
                ),
            });
        }

        let derived = serde_json::to_value(&projection)?;
        let snapshot = ctx
            .store
            .append(
                SnapshotKind::Stats,
                &entry.subject_id,
                payload,
                derived.clone(),
            )
            .await?;

        Ok(ItemOutcome::Saved {
            summary: json!({
                "snapshot_id": snapshot.id,
                "populated_fields": projection.populated(),
                "derived": derived,
            }),
            secondary_change: false,
        })
    }
}
