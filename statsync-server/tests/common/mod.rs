#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response},
};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use statsync_core::crawler::CrawlSettings;
use statsync_core::database::infrastructure::memory::MemoryEntryRegistry;
use statsync_core::leaderboard::LeaderboardSettings;
use statsync_core::types::{LeaderboardKey, RegistryEntry, SubjectId};
use statsync_core::upstream::{IdentityApi, IdentityProfile, StatsApi};
use statsync_core::{ManualClock, Result, SyncError, SyncStores};
use statsync_server::{AppState, create_app};

pub fn subject(n: u8) -> SubjectId {
    SubjectId::parse(&format!("{n:032x}")).expect("valid subject id")
}

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
pub struct StubStats {
    players: Mutex<HashMap<SubjectId, Value>>,
    leaders: Mutex<HashMap<LeaderboardKey, Vec<SubjectId>>>,
    leaders_fail: AtomicBool,
    pub leader_calls: AtomicU32,
}

impl StubStats {
    pub fn set_player(&self, id: &SubjectId, payload: Value) {
        self.players.lock().insert(id.clone(), payload);
    }

    pub fn set_leaders(&self, key: &LeaderboardKey, ids: Vec<SubjectId>) {
        self.leaders.lock().insert(key.clone(), ids);
    }

    pub fn fail_leaders(&self) {
        self.leaders_fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatsApi for StubStats {
    async fn player(&self, id: &SubjectId) -> Result<Value> {
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
        if self.leaders_fail.load(Ordering::SeqCst) {
            return Err(SyncError::upstream(503, "leaderboards unavailable"));
        }
        Ok(self
            .leaders
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct StubIdentity {
    profiles: Mutex<HashMap<SubjectId, IdentityProfile>>,
}

impl StubIdentity {
    pub fn set_profile(&self, id: &SubjectId, name: &str, skin: Option<&str>) {
        self.profiles.lock().insert(
            id.clone(),
            IdentityProfile {
                id: id.clone(),
                name: name.to_string(),
                skin_url: skin.map(str::to_string),
                cape_url: None,
                raw: json!({ "id": id.as_str(), "name": name }),
            },
        );
    }
}

#[async_trait]
impl IdentityApi for StubIdentity {
    async fn profile(&self, id: &SubjectId) -> Result<IdentityProfile> {
        self.profiles
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::upstream(404, format!("no profile for {id}")))
    }

    async fn probe_secondary_cape(&self, _name: &str) -> Option<String> {
        None
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub stats: Arc<StubStats>,
    pub identity: Arc<StubIdentity>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    /// Memory backends with `Player1..=n` registered and known to both stubs.
    pub fn with_players(n: u8) -> Self {
        let stats = Arc::new(StubStats::default());
        let identity = Arc::new(StubIdentity::default());
        let mut entries = Vec::new();
        for i in 1..=n {
            let id = subject(i);
            let name = format!("Player{i}");
            stats.set_player(&id, player_payload(&name, f64::from(10 * i)));
            identity.set_profile(&id, &name, Some(&format!("http://textures/skin-{i}")));
            entries.push(RegistryEntry::new(id, name));
        }

        let stores = SyncStores::in_memory_with_registry(Arc::new(
            MemoryEntryRegistry::with_entries(entries),
        ));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let state = AppState::from_parts(
            stores,
            stats.clone(),
            identity.clone(),
            clock.clone(),
            CrawlSettings {
                default_sleep_ms: 0,
                scheduler_enabled: false,
                ..CrawlSettings::default()
            },
            LeaderboardSettings::default(),
        );
        let router = create_app(state.clone());

        Self {
            state,
            router,
            stats,
            identity,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
