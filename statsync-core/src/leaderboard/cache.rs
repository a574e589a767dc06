use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::settings::LeaderboardSettings;
use crate::clock::Clock;
use crate::database::ports::LeaderboardRepository;
use crate::error::{Result, SyncError};
use crate::locks::{AdvisoryKey, LockCoordinator, LockOutcome};
use crate::types::{LeaderboardKey, LeaderboardRow, LeaderboardSnapshot, SubjectId};
use crate::upstream::{StatsApi, display_name, stat_value};

pub const LEADERBOARD_LOCK_NAMESPACE: &str = "leaderboard";

/// Per-key single-flight slot. The generation moves on every completed
/// refresh, so a caller that queued behind one can tell it already happened.
/// The lock holds the error of the last refresh, if it failed, for those
/// callers to return.
#[derive(Debug, Default)]
struct RefreshSlot {
    generation: AtomicU64,
    lock: Mutex<Option<Arc<SyncError>>>,
}

/// Clears a key's background in-flight marker however the task ends.
struct InFlight {
    keys: Arc<DashSet<LeaderboardKey>>,
    key: LeaderboardKey,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}

/// Stale-while-revalidate cache of ranked lists per `(stat, scope)`.
///
/// Fresh boards are served as stored. Stale boards are served immediately
/// while one background refresh runs. Missing boards are fetched inline.
/// Refreshes of one key are coalesced inside the process and serialised
/// across processes by an advisory lock.
#[derive(Debug)]
pub struct LeaderboardCache {
    repo: Arc<dyn LeaderboardRepository>,
    stats: Arc<dyn StatsApi>,
    locks: LockCoordinator,
    clock: Arc<dyn Clock>,
    settings: LeaderboardSettings,
    slots: DashMap<LeaderboardKey, Arc<RefreshSlot>>,
    in_flight: Arc<DashSet<LeaderboardKey>>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl LeaderboardCache {
    pub fn new(
        repo: Arc<dyn LeaderboardRepository>,
        stats: Arc<dyn StatsApi>,
        locks: LockCoordinator,
        clock: Arc<dyn Clock>,
        settings: LeaderboardSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.background_concurrency.max(1)));
        Self {
            repo,
            stats,
            locks,
            clock,
            settings,
            slots: DashMap::new(),
            in_flight: Arc::new(DashSet::new()),
            permits,
            tracker: TaskTracker::new(),
        }
    }

    pub fn settings(&self) -> &LeaderboardSettings {
        &self.settings
    }

    /// Ranked rows for `key`. Waits for at most one upstream refresh, and
    /// only when nothing is cached yet.
    pub async fn get(self: &Arc<Self>, key: &LeaderboardKey) -> Result<Vec<LeaderboardRow>> {
        match self.repo.latest(key).await? {
            Some(snapshot) if self.is_fresh(&snapshot) => Ok(snapshot.rows),
            Some(snapshot) => {
                debug!(target: "leaderboard", board = %key, "serving stale board, revalidating");
                self.spawn_refresh(key.clone());
                Ok(snapshot.rows)
            }
            None => {
                info!(target: "leaderboard", board = %key, "no cached board, refreshing inline");
                self.refresh(key).await
            }
        }
    }

    /// Coalesced refresh of `key`. Concurrent callers in this process share
    /// one upstream sequence; callers that queued behind a completed refresh
    /// get its outcome instead of starting another: the stored board, or the
    /// same error when it failed.
    pub async fn refresh(&self, key: &LeaderboardKey) -> Result<Vec<LeaderboardRow>> {
        let slot = self.slots.entry(key.clone()).or_default().clone();
        let observed = slot.generation.load(Ordering::Acquire);

        let mut last_failure = slot.lock.lock().await;
        if slot.generation.load(Ordering::Acquire) != observed {
            return match last_failure.as_ref() {
                Some(err) => Err(SyncError::Shared(Arc::clone(err))),
                None => self.current_rows(key).await,
            };
        }

        let result = self.refresh_across_processes(key).await;
        slot.generation.fetch_add(1, Ordering::AcqRel);
        match result {
            Ok(rows) => {
                *last_failure = None;
                Ok(rows)
            }
            Err(err) => {
                let err = Arc::new(err);
                *last_failure = Some(Arc::clone(&err));
                Err(SyncError::Shared(err))
            }
        }
    }

    /// Waits for every background refresh spawned so far.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn is_fresh(&self, snapshot: &LeaderboardSnapshot) -> bool {
        snapshot.age(self.clock.now()) < self.settings.freshness()
    }

    async fn current_rows(&self, key: &LeaderboardKey) -> Result<Vec<LeaderboardRow>> {
        Ok(self
            .repo
            .latest(key)
            .await?
            .map(|snapshot| snapshot.rows)
            .unwrap_or_default())
    }

    fn spawn_refresh(self: &Arc<Self>, key: LeaderboardKey) {
        if !self.in_flight.insert(key.clone()) {
            return;
        }
        let marker = InFlight {
            keys: Arc::clone(&self.in_flight),
            key: key.clone(),
        };

        let cache = Arc::clone(self);
        self.tracker.spawn(async move {
            let _marker = marker;
            let Ok(_permit) = cache.permits.acquire().await else {
                return;
            };
            if let Err(err) = cache.refresh(&key).await {
                warn!(target: "leaderboard", board = %key, error = %err, "background refresh failed");
            }
        });
    }

    async fn refresh_across_processes(
        &self,
        key: &LeaderboardKey,
    ) -> Result<Vec<LeaderboardRow>> {
        let lock_key = AdvisoryKey::hashed(
            LEADERBOARD_LOCK_NAMESPACE,
            &[key.stat.as_str(), key.scope.as_str()],
        );

        match self
            .locks
            .with_advisory_lock(lock_key, || self.refresh_locked(key))
            .await?
        {
            LockOutcome::Ran(rows) => Ok(rows),
            LockOutcome::Skipped => {
                debug!(target: "leaderboard", board = %key, "refresh running elsewhere, serving current board");
                self.current_rows(key).await
            }
        }
    }

    async fn refresh_locked(&self, key: &LeaderboardKey) -> Result<Vec<LeaderboardRow>> {
        let previous = self.repo.latest(key).await?;
        if let Some(previous) = &previous
            && self.is_fresh(previous)
        {
            debug!(target: "leaderboard", board = %key, "board refreshed elsewhere meanwhile");
            return Ok(previous.rows.clone());
        }

        match self.fetch_rows(key).await {
            Ok(rows) if !rows.is_empty() => {
                let snapshot = LeaderboardSnapshot::new(key.clone(), rows, self.clock.now());
                self.repo.insert(&snapshot).await?;
                info!(target: "leaderboard", board = %key, rows = snapshot.rows.len(), "board refreshed");
                Ok(snapshot.rows)
            }
            Ok(_) => {
                warn!(target: "leaderboard", board = %key, "provider returned an empty board, keeping previous rows");
                Ok(previous.map(|p| p.rows).unwrap_or_default())
            }
            Err(err) => match previous {
                Some(previous) => {
                    warn!(target: "leaderboard", board = %key, error = %err, "refresh failed, keeping previous rows");
                    Ok(previous.rows)
                }
                None => Err(err),
            },
        }
    }

    /// Leaders for `key` capped at `max_rows`; the first `max_resolve` get a
    /// display name and value, the rest keep their id as name and no value.
    async fn fetch_rows(&self, key: &LeaderboardKey) -> Result<Vec<LeaderboardRow>> {
        let leaders = self
            .stats
            .leaders(key, Some(self.settings.listing_revalidate()))
            .await?;

        let mut rows = Vec::with_capacity(leaders.len().min(self.settings.max_rows));
        for (position, subject_id) in
            leaders.into_iter().take(self.settings.max_rows).enumerate()
        {
            let (display_name, value) = if position < self.settings.max_resolve {
                self.resolve(key, &subject_id).await
            } else {
                (subject_id.to_string(), None)
            };

            rows.push(LeaderboardRow {
                subject_id,
                display_name,
                value,
                rank: position as u32 + 1,
            });
        }
        Ok(rows)
    }

    async fn resolve(
        &self,
        key: &LeaderboardKey,
        subject_id: &SubjectId,
    ) -> (String, Option<f64>) {
        match self.stats.player(subject_id).await {
            Ok(payload) => (
                display_name(&payload)
                    .map(str::to_string)
                    .unwrap_or_else(|| subject_id.to_string()),
                stat_value(&payload, &key.scope, &key.stat),
            ),
            Err(err) => {
                debug!(target: "leaderboard", board = %key, subject = %subject_id, error = %err, "could not resolve leader");
                (subject_id.to_string(), None)
            }
        }
    }
}
