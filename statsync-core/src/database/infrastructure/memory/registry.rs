use async_trait::async_trait;
use parking_lot::RwLock;

use crate::database::ports::EntryRegistry;
use crate::error::Result;
use crate::types::{IdentityChange, RegistryEntry};

#[derive(Debug, Default)]
pub struct MemoryEntryRegistry {
    entries: RwLock<Vec<RegistryEntry>>,
    identity_history: RwLock<Vec<IdentityChange>>,
}

impl MemoryEntryRegistry {
    pub fn with_entries(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
            identity_history: RwLock::default(),
        }
    }

    /// Adds or replaces an entry.
    pub fn upsert(&self, entry: RegistryEntry) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.subject_id == entry.subject_id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    pub fn identity_history(&self) -> Vec<IdentityChange> {
        self.identity_history.read().clone()
    }
}

#[async_trait]
impl EntryRegistry for MemoryEntryRegistry {
    async fn list_entries(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self.entries.read().clone())
    }

    async fn record_identity_change(&self, change: &IdentityChange) -> Result<()> {
        if let Some(entry) = self
            .entries
            .write()
            .iter_mut()
            .find(|e| e.subject_id == change.subject_id)
        {
            entry.display_name = change.current_name.clone();
        }
        self.identity_history.write().push(change.clone());
        Ok(())
    }
}
