use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Two-integer key of a database advisory lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdvisoryKey {
    pub key1: i32,
    pub key2: i32,
}

impl AdvisoryKey {
    pub const fn new(key1: i32, key2: i32) -> Self {
        Self { key1, key2 }
    }

    /// Stable key derived from a namespace and free-form parts. Identical
    /// inputs give identical keys in every process.
    pub fn hashed(namespace: &str, parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        for part in parts {
            hasher.update([0x1f]);
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();

        let key1 = i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let key2 = i32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]);
        Self { key1, key2 }
    }
}

impl fmt::Display for AdvisoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.key1, self.key2)
    }
}

/// Backend-specific handle on an acquired lock.
#[async_trait]
pub trait AdvisoryHold: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

/// An acquired advisory lock. Call [`AdvisoryGuard::release`]; if the guard is
/// dropped instead, the backend frees the lock on its own (for Postgres by
/// closing the session that owns it).
pub struct AdvisoryGuard {
    key: AdvisoryKey,
    hold: Box<dyn AdvisoryHold>,
}

impl fmt::Debug for AdvisoryGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisoryGuard").field("key", &self.key).finish()
    }
}

impl AdvisoryGuard {
    pub fn new(key: AdvisoryKey, hold: impl AdvisoryHold + 'static) -> Self {
        Self {
            key,
            hold: Box::new(hold),
        }
    }

    pub fn key(&self) -> AdvisoryKey {
        self.key
    }

    pub async fn release(self) -> Result<()> {
        self.hold.release().await
    }
}

#[async_trait]
pub trait AdvisoryLocks: Send + Sync + fmt::Debug {
    /// Non-blocking acquire. `None` when another session holds `key`.
    async fn try_acquire(&self, key: AdvisoryKey) -> Result<Option<AdvisoryGuard>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_keys_are_stable_and_separate_namespaces() {
        let a = AdvisoryKey::hashed("leaderboard", &["wins", "bedwars"]);
        let b = AdvisoryKey::hashed("leaderboard", &["wins", "bedwars"]);
        assert_eq!(a, b);

        assert_ne!(a, AdvisoryKey::hashed("leaderboard", &["winsbedwars"]));
        assert_ne!(a, AdvisoryKey::hashed("crawl", &["wins", "bedwars"]));
    }
}
