use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{IdentityChange, RegistryEntry};

/// The externally owned list of tracked subjects. The crawlers only read it,
/// apart from recording identity changes.
#[async_trait]
pub trait EntryRegistry: Send + Sync + fmt::Debug {
    async fn list_entries(&self) -> Result<Vec<RegistryEntry>>;

    /// Patches the entry's display name and appends to its identity history.
    async fn record_identity_change(&self, change: &IdentityChange)
    -> Result<()>;
}
