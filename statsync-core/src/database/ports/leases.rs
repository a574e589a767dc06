use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::Result;

#[async_trait]
pub trait LeaseRepository: Send + Sync + fmt::Debug {
    /// Creates or takes over the lease for `key` when it is absent or
    /// `locked_until <= now`. Returns `false` while a live lease exists.
    async fn try_acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<bool>;

    /// Resets the lease into the past so it is immediately reclaimable.
    async fn release(&self, key: &str) -> Result<()>;

    async fn locked_until(&self, key: &str) -> Result<Option<DateTime<Utc>>>;
}
