#![cfg(feature = "pg-tests")]

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use sqlx::PgPool;
use statsync_core::crawler::{
    BatchCrawler, CrawlEventBus, CrawlRequest, CrawlSettings, CrawlerDeps, StatsCrawlJob,
};
use statsync_core::database::ports::{
    CrawlEventRepository, CrawlRunRepository, EntryRegistry, LeaderboardRepository,
    LeaseRepository, SnapshotRepository,
};
use statsync_core::locks::{AdvisoryKey, AdvisoryLocks};
use statsync_core::types::{
    CrawlEvent, CrawlEventType, CrawlParams, CrawlRun, EventLevel, IdentityChange,
    LeaderboardKey, LeaderboardRow, LeaderboardSnapshot, RunId, RunSummary, Snapshot,
    SnapshotKind,
};
use statsync_core::{ManualClock, SyncStores};

use common::{FakeStats, player_payload, subject};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

async fn register(pool: &PgPool, id: &str, name: &str) {
    sqlx::query("INSERT INTO registry_entries (subject_id, display_name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .expect("insert registry entry");
}

#[sqlx::test(migrator = "statsync_core::MIGRATOR")]
async fn lease_excludes_until_expiry_or_release(pool: PgPool) {
    let stores = SyncStores::postgres(pool);
    let leases = stores.leases;
    let now = t0();

    assert!(leases.try_acquire("autosync", now, now + Duration::minutes(30)).await.unwrap());
    assert!(!leases.try_acquire("autosync", now, now + Duration::minutes(30)).await.unwrap());
    assert_eq!(
        leases.locked_until("autosync").await.unwrap(),
        Some(now + Duration::minutes(30))
    );

    let later = now + Duration::minutes(31);
    assert!(leases.try_acquire("autosync", later, later + Duration::minutes(30)).await.unwrap());

    leases.release("autosync").await.unwrap();
    assert!(leases.try_acquire("autosync", later, later).await.unwrap());
    // A zero TTL lease is reclaimable right away.
    assert!(leases.try_acquire("autosync", later, later).await.unwrap());
}

#[sqlx::test(migrator = "statsync_core::MIGRATOR")]
async fn advisory_lock_is_exclusive_across_sessions(pool: PgPool) {
    let stores = SyncStores::postgres(pool);
    let key = AdvisoryKey::new(0x5359_4e43, 1);

    let guard = stores.advisory.try_acquire(key).await.unwrap().expect("free");
    assert!(stores.advisory.try_acquire(key).await.unwrap().is_none());

    guard.release().await.unwrap();
    let again = stores.advisory.try_acquire(key).await.unwrap().expect("released");
    again.release().await.unwrap();
}

#[sqlx::test(migrator = "statsync_core::MIGRATOR")]
async fn snapshots_track_latest_per_subject(pool: PgPool) {
    let stores = SyncStores::postgres(pool);
    let (a, b) = (subject(1), subject(2));

    for (id, minutes_ago) in [(&a, 60), (&a, 10), (&b, 30)] {
        let snapshot = Snapshot::new(
            SnapshotKind::Identity,
            id.clone(),
            t0() - Duration::minutes(minutes_ago),
            json!({ "name": "n" }),
            json!({ "skin_url": format!("skin-{minutes_ago}") }),
        );
        stores.snapshots.append(&snapshot).await.unwrap();
    }

    let latest = stores.snapshots.latest_fetched_all(SnapshotKind::Identity).await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[&a], t0() - Duration::minutes(10));
    assert!(
        stores
            .snapshots
            .latest_fetched_all(SnapshotKind::Stats)
            .await
            .unwrap()
            .is_empty()
    );

    let history = stores
        .snapshots
        .list_newest_first(SnapshotKind::Identity, &a)
        .await
        .unwrap();
    let skins: Vec<_> = history.iter().map(|s| s.derived["skin_url"].clone()).collect();
    assert_eq!(skins, vec![json!("skin-10"), json!("skin-60")]);
}

#[sqlx::test(migrator = "statsync_core::MIGRATOR")]
async fn crawl_runs_and_events_round_trip(pool: PgPool) {
    let stores = SyncStores::postgres(pool);
    let run_id = RunId::new();
    let params = CrawlParams::new(10, 60, 0, true);

    stores
        .runs
        .create(&CrawlRun::started(run_id, "stats", &params, t0()))
        .await
        .unwrap();
    let summary = RunSummary {
        candidates: 2,
        processed: 2,
        snapshotted: 1,
        secondary_changes: 0,
        errors: 1,
    };
    stores
        .runs
        .finish(run_id, &summary, t0() + Duration::seconds(5))
        .await
        .unwrap();

    let run = stores.runs.get(run_id).await.unwrap().unwrap();
    assert!(run.ran);
    assert_eq!(run.limit, 10);
    assert_eq!(run.summary, summary);
    assert_eq!(run.finished_at, Some(t0() + Duration::seconds(5)));
    assert_eq!(stores.runs.recent("stats", 5).await.unwrap().len(), 1);
    assert!(stores.runs.recent("identity", 5).await.unwrap().is_empty());

    let event = CrawlEvent {
        run_id,
        level: EventLevel::Warn,
        event_type: CrawlEventType::ItemError,
        subject_id: Some(subject(3)),
        message: Some("skipped".into()),
        meta: Some(json!({ "skipped": true })),
        created_at: t0(),
    };
    stores.events.insert(&event).await.unwrap();
    assert_eq!(stores.events.list_for_run(run_id).await.unwrap(), vec![event]);
}

#[sqlx::test(migrator = "statsync_core::MIGRATOR")]
async fn leaderboard_latest_wins(pool: PgPool) {
    let stores = SyncStores::postgres(pool);
    let key = LeaderboardKey::new("wins", "bedwars");
    let row = |name: &str| LeaderboardRow {
        subject_id: subject(1),
        display_name: name.to_string(),
        value: Some(12.0),
        rank: 1,
    };

    stores
        .leaderboards
        .insert(&LeaderboardSnapshot::new(key.clone(), vec![row("old")], t0()))
        .await
        .unwrap();
    stores
        .leaderboards
        .insert(&LeaderboardSnapshot::new(
            key.clone(),
            vec![row("new")],
            t0() + Duration::hours(1),
        ))
        .await
        .unwrap();

    let latest = stores.leaderboards.latest(&key).await.unwrap().unwrap();
    assert_eq!(latest.rows, vec![row("new")]);
    assert!(
        stores
            .leaderboards
            .latest(&LeaderboardKey::new("wins", "skywars"))
            .await
            .unwrap()
            .is_none()
    );
}

#[sqlx::test(migrator = "statsync_core::MIGRATOR")]
async fn identity_change_updates_the_registry(pool: PgPool) {
    let id = subject(5);
    register(&pool, id.as_str(), "Before").await;
    let stores = SyncStores::postgres(pool.clone());

    stores
        .registry
        .record_identity_change(&IdentityChange {
            subject_id: id.clone(),
            previous_name: "Before".into(),
            current_name: "After".into(),
            observed_at: t0(),
        })
        .await
        .unwrap();

    let entries = stores.registry.list_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].display_name, "After");

    let history: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM registry_identity_history WHERE subject_id = $1")
            .bind(id.as_str())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(history, 1);
}

#[sqlx::test(migrator = "statsync_core::MIGRATOR")]
async fn stats_crawl_against_postgres(pool: PgPool) {
    let (a, b) = (subject(1), subject(2));
    register(&pool, a.as_str(), "A").await;
    register(&pool, b.as_str(), "B").await;

    let stats = Arc::new(FakeStats::default());
    stats.set_player(&a, player_payload("A", 3.0));
    stats.set_player(&b, player_payload("B", 4.0));

    let stores = SyncStores::postgres(pool);
    let clock = Arc::new(ManualClock::new(t0()));
    let crawler = BatchCrawler::new(
        StatsCrawlJob::new(stats.clone(), 2),
        CrawlerDeps::from_stores(&stores, CrawlEventBus::new(64), clock.clone()),
        CrawlSettings {
            default_sleep_ms: 0,
            ..CrawlSettings::default()
        },
    );

    let report = crawler.run_batch(CrawlRequest::default()).await.unwrap();
    assert!(report.ran);
    assert_eq!(report.summary.unwrap().snapshotted, 2);
    assert_eq!(crawler.queue_size(60).await.unwrap(), 0);

    let run = stores.runs.get(report.run_id).await.unwrap().unwrap();
    assert!(run.ran);
    assert_eq!(run.summary.snapshotted, 2);
}
