use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::database::ports::LeaseRepository;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MemoryLeaseRepository {
    leases: Mutex<HashMap<String, DateTime<Utc>>>,
}

#[async_trait]
impl LeaseRepository for MemoryLeaseRepository {
    async fn try_acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<bool> {
        let mut leases = self.leases.lock();
        match leases.get(key) {
            Some(current) if *current > now => Ok(false),
            _ => {
                leases.insert(key.to_string(), locked_until);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> Result<()> {
        if let Some(until) = self.leases.lock().get_mut(key) {
            *until = DateTime::<Utc>::UNIX_EPOCH;
        }
        Ok(())
    }

    async fn locked_until(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.leases.lock().get(key).copied())
    }
}
