use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{CRAWL_LOCK_NAMESPACE, CrawlJob, ItemContext, ItemOutcome};
use crate::error::Result;
use crate::locks::AdvisoryKey;
use crate::types::{
    CrawlEventType, IdentityChange, RegistryEntry, SnapshotKind, TextureSet,
};
use crate::upstream::IdentityApi;

/// Resolves canonical identity and textures. A changed name is recorded in
/// the registry before the snapshot is written.
#[derive(Debug, Clone)]
pub struct IdentityCrawlJob {
    api: Arc<dyn IdentityApi>,
}

impl IdentityCrawlJob {
    pub const NAME: &'static str = "identity";

    pub fn new(api: Arc<dyn IdentityApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CrawlJob for IdentityCrawlJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn advisory_key(&self) -> AdvisoryKey {
        AdvisoryKey::new(CRAWL_LOCK_NAMESPACE, 2)
    }

    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::Identity
    }

    async fn process(
        &self,
        ctx: ItemContext<'_>,
        entry: &RegistryEntry,
    ) -> Result<ItemOutcome> {
        let profile = self.api.profile(&entry.subject_id).await?;
        let secondary_cape_url =
            self.api.probe_secondary_cape(&profile.name).await;

        let renamed = !profile.name.is_empty()
            && profile.name != entry.display_name;
        if renamed {
            let change = IdentityChange {
                subject_id: entry.subject_id.clone(),
                previous_name: entry.display_name.clone(),
                current_name: profile.name.clone(),
                observed_at: ctx.clock.now(),
            };
            ctx.registry.record_identity_change(&change).await?;
            ctx.emitter.info(
                CrawlEventType::ItemChanged,
                Some(&entry.subject_id),
                Some(format!(
                    "{} is now {}",
                    change.previous_name, change.current_name
                )),
                Some(json!({
                    "previous_name": change.previous_name,
                    "current_name": change.current_name,
                })),
            );
        }

        let textures = TextureSet {
            name: profile.name,
            skin_url: profile.skin_url,
            cape_url: profile.cape_url,
            secondary_cape_url,
        };
        let derived = serde_json::to_value(&textures)?;

        let snapshot = ctx
            .store
            .append(
                SnapshotKind::Identity,
                &entry.subject_id,
                profile.raw,
                derived.clone(),
            )
            .await?;

        Ok(ItemOutcome::Saved {
            summary: json!({
                "snapshot_id": snapshot.id,
                "derived": derived,
            }),
            secondary_change: renamed,
        })
    }
}
