use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::locks::{AdvisoryGuard, AdvisoryHold, AdvisoryKey, AdvisoryLocks};

#[derive(Debug, Default, Clone)]
pub struct MemoryAdvisoryLocks {
    held: Arc<Mutex<HashSet<AdvisoryKey>>>,
}

impl MemoryAdvisoryLocks {
    pub fn is_held(&self, key: AdvisoryKey) -> bool {
        self.held.lock().contains(&key)
    }
}

#[async_trait]
impl AdvisoryLocks for MemoryAdvisoryLocks {
    async fn try_acquire(&self, key: AdvisoryKey) -> Result<Option<AdvisoryGuard>> {
        if !self.held.lock().insert(key) {
            return Ok(None);
        }
        Ok(Some(AdvisoryGuard::new(
            key,
            MemoryHold {
                key,
                held: Arc::clone(&self.held),
            },
        )))
    }
}

struct MemoryHold {
    key: AdvisoryKey,
    held: Arc<Mutex<HashSet<AdvisoryKey>>>,
}

#[async_trait]
impl AdvisoryHold for MemoryHold {
    async fn release(self: Box<Self>) -> Result<()> {
        // Drop does the work.
        Ok(())
    }
}

impl Drop for MemoryHold {
    fn drop(&mut self) {
        self.held.lock().remove(&self.key);
    }
}
