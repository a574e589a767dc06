//! Cluster-wide mutual exclusion.
//!
//! Two primitives with different guarantees live here. A *lease* is a
//! TTL-bounded row in `sync_leases`, good enough for one periodic job that
//! nothing else starts. An *advisory lock* is database-native and
//! session-scoped; it is what keeps the scheduler, manual triggers and the
//! streaming endpoint from running the same batch twice.

pub mod advisory;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

pub use advisory::{AdvisoryGuard, AdvisoryHold, AdvisoryKey, AdvisoryLocks};

use crate::clock::Clock;
use crate::database::ports::LeaseRepository;
use crate::error::{Result, SyncError};

/// Result of an advisory-locked section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockOutcome<T> {
    Ran(T),
    /// Someone else holds the lock; the section did not execute.
    Skipped,
}

impl<T> LockOutcome<T> {
    pub fn ran(&self) -> bool {
        matches!(self, LockOutcome::Ran(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            LockOutcome::Ran(value) => Some(value),
            LockOutcome::Skipped => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LockCoordinator {
    leases: Arc<dyn LeaseRepository>,
    advisory: Arc<dyn AdvisoryLocks>,
    clock: Arc<dyn Clock>,
}

impl LockCoordinator {
    pub fn new(
        leases: Arc<dyn LeaseRepository>,
        advisory: Arc<dyn AdvisoryLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            leases,
            advisory,
            clock,
        }
    }

    /// Runs `f` while holding the lease `key` for at most `ttl`.
    ///
    /// Fails with [`SyncError::AlreadyLocked`] while a live lease exists. The
    /// lease is reset to the past on every exit path, panics included; a
    /// crashed holder's lease becomes reclaimable once `ttl` has passed.
    pub async fn with_lease<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ttl = chrono::Duration::from_std(ttl).map_err(|err| {
            SyncError::Internal(format!("lease ttl out of range: {err}"))
        })?;
        let now = self.clock.now();

        if !self.leases.try_acquire(key, now, now + ttl).await? {
            debug!(target: "locks", key, "lease is held elsewhere");
            return Err(SyncError::AlreadyLocked {
                key: key.to_string(),
            });
        }
        debug!(target: "locks", key, ttl_secs = ttl.num_seconds(), "lease acquired");

        let outcome = AssertUnwindSafe(f()).catch_unwind().await;

        if let Err(err) = self.leases.release(key).await {
            warn!(target: "locks", key, error = %err, "failed to release lease, it will expire on its own");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Runs `f` under the advisory lock `key`, or returns
    /// [`LockOutcome::Skipped`] right away when it is taken. An error from `f`
    /// is returned after the lock has been released.
    pub async fn with_advisory_lock<T, F, Fut>(
        &self,
        key: AdvisoryKey,
        f: F,
    ) -> Result<LockOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(guard) = self.advisory.try_acquire(key).await? else {
            debug!(target: "locks", %key, "advisory lock busy, skipping");
            return Ok(LockOutcome::Skipped);
        };

        let outcome = AssertUnwindSafe(f()).catch_unwind().await;

        if let Err(err) = guard.release().await {
            warn!(target: "locks", %key, error = %err, "advisory unlock failed");
        }

        match outcome {
            Ok(result) => result.map(LockOutcome::Ran),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
