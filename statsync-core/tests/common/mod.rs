#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use statsync_core::database::ports::SnapshotRepository;
use statsync_core::types::{LeaderboardKey, Snapshot, SnapshotKind, SubjectId};
use statsync_core::upstream::{IdentityApi, IdentityProfile, StatsApi};
use statsync_core::{Result, SyncError};

pub fn subject(n: u8) -> SubjectId {
    SubjectId::parse(&format!("{n:032x}")).expect("valid subject id")
}

/// Player payload that projects to a usable stats row.
pub fn player_payload(name: &str, wins: f64) -> Value {
    json!({
        "success": true,
        "player": {
            "displayname": name,
            "networkExp": 1_000.0,
            "karma": 50.0,
            "stats": { "Bedwars": { "wins_bedwars": wins } }
        }
    })
}

#[derive(Debug, Default)]
pub struct FakeStats {
    players: Mutex<HashMap<SubjectId, Value>>,
    failing: Mutex<HashSet<SubjectId>>,
    leaders: Mutex<HashMap<LeaderboardKey, Vec<SubjectId>>>,
    leaders_fail: AtomicBool,
    leaders_delay: Mutex<Option<Duration>>,
    pub player_calls: AtomicU32,
    pub leader_calls: AtomicU32,
}

impl FakeStats {
    pub fn with_player(self, id: &SubjectId, payload: Value) -> Self {
        self.players.lock().insert(id.clone(), payload);
        self
    }

    pub fn set_player(&self, id: &SubjectId, payload: Value) {
        self.players.lock().insert(id.clone(), payload);
    }

    pub fn fail_player(&self, id: &SubjectId) {
        self.failing.lock().insert(id.clone());
    }

    pub fn set_leaders(&self, key: &LeaderboardKey, ids: Vec<SubjectId>) {
        self.leaders.lock().insert(key.clone(), ids);
    }

    pub fn fail_leaders(&self, fail: bool) {
        self.leaders_fail.store(fail, Ordering::SeqCst);
    }

    pub fn delay_leaders(&self, delay: Duration) {
        *self.leaders_delay.lock() = Some(delay);
    }

    pub fn player_calls(&self) -> u32 {
        self.player_calls.load(Ordering::SeqCst)
    }

    pub fn leader_calls(&self) -> u32 {
        self.leader_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatsApi for FakeStats {
    async fn player(&self, id: &SubjectId) -> Result<Value> {
        self.player_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(id) {
            return Err(SyncError::upstream(500, "provider exploded"));
        }
        self.players
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::upstream(404, format!("no player payload for {id}")))
    }

    async fn leaders(
        &self,
        key: &LeaderboardKey,
        _revalidate: Option<Duration>,
    ) -> Result<Vec<SubjectId>> {
        self.leader_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.leaders_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.leaders_fail.load(Ordering::SeqCst) {
            return Err(SyncError::upstream(503, "leaderboards unavailable"));
        }
        Ok(self.leaders.lock().get(key).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct FakeIdentity {
    profiles: Mutex<HashMap<SubjectId, IdentityProfile>>,
    secondary: Mutex<HashMap<String, String>>,
    pub profile_calls: AtomicU32,
}

impl FakeIdentity {
    pub fn set_profile(&self, id: &SubjectId, name: &str, skin: Option<&str>, cape: Option<&str>) {
        self.profiles.lock().insert(
            id.clone(),
            IdentityProfile {
                id: id.clone(),
                name: name.to_string(),
                skin_url: skin.map(str::to_string),
                cape_url: cape.map(str::to_string),
                raw: json!({ "id": id.as_str(), "name": name }),
            },
        );
    }

    pub fn set_secondary_cape(&self, name: &str, url: &str) {
        self.secondary
            .lock()
            .insert(name.to_string(), url.to_string());
    }
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn profile(&self, id: &SubjectId) -> Result<IdentityProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::upstream(404, format!("no profile for {id}")))
    }

    async fn probe_secondary_cape(&self, name: &str) -> Option<String> {
        self.secondary.lock().get(name).cloned()
    }
}

/// Snapshot repository whose writes always fail, for persistence aborts.
#[derive(Debug, Default)]
pub struct BrokenSnapshots;

#[async_trait]
impl SnapshotRepository for BrokenSnapshots {
    async fn append(&self, _snapshot: &Snapshot) -> Result<()> {
        Err(SyncError::Persistence("Insert snapshot failed: disk full".into()))
    }

    async fn latest_fetched_at(
        &self,
        _kind: SnapshotKind,
        _subject: &SubjectId,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }

    async fn latest_fetched_all(
        &self,
        _kind: SnapshotKind,
    ) -> Result<HashMap<SubjectId, DateTime<Utc>>> {
        Ok(HashMap::new())
    }

    async fn latest(
        &self,
        _kind: SnapshotKind,
        _subject: &SubjectId,
    ) -> Result<Option<Snapshot>> {
        Ok(None)
    }

    async fn list_newest_first(
        &self,
        _kind: SnapshotKind,
        _subject: &SubjectId,
    ) -> Result<Vec<Snapshot>> {
        Ok(Vec::new())
    }
}
