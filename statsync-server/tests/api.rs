mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Duration;
use serde_json::json;
use statsync_core::database::ports::{CrawlRunRepository, LeaseRepository};
use statsync_core::Clock;
use statsync_core::types::LeaderboardKey;
use statsync_server::infra::startup::{AUTOSYNC_LEASE, run_scheduled_sync};

use common::{TestApp, body_json, body_text, subject};

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::with_players(0);
    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn run_endpoint_crawls_and_feeds_dashboards() {
    let app = TestApp::with_players(2);

    let response = app
        .get("/api/v1/crawl/stats/queue?min_age_minutes=60")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["queue_size"], 2);

    let response = app
        .post_json("/api/v1/crawl/stats/run", json!({ "limit": 5, "sleep_ms": 0 }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["ran"], true);
    assert_eq!(report["summary"]["candidates"], 2);
    assert_eq!(report["summary"]["snapshotted"], 2);
    assert!(report.get("error").is_none());

    let queue = body_json(
        app.get("/api/v1/crawl/stats/queue?min_age_minutes=60")
            .await,
    )
    .await;
    assert_eq!(queue["queue_size"], 0);
    assert_eq!(queue["job"], "stats");

    let runs = body_json(app.get("/api/v1/crawl/stats/runs?limit=5").await).await;
    assert_eq!(runs["count"], 1);
    assert_eq!(runs["runs"][0]["job"], "stats");
    assert_eq!(runs["runs"][0]["ran"], true);

    let identity_runs =
        body_json(app.get("/api/v1/crawl/identity/runs").await).await;
    assert_eq!(identity_runs["count"], 0);
}

#[tokio::test]
async fn run_without_a_body_uses_configured_defaults() {
    let app = TestApp::with_players(1);
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/v1/crawl/identity/run")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["ran"], true);
    assert_eq!(report["summary"]["snapshotted"], 1);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = TestApp::with_players(1);
    let response = app.post_json("/api/v1/crawl/skins/run", json!({})).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["status"], 404);
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("skins")
    );
}

#[tokio::test]
async fn stream_endpoint_emits_named_events_until_run_finished() {
    let app = TestApp::with_players(2);
    let response = app
        .get("/api/v1/crawl/identity/stream?sleep_ms=0&verbose=true")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    // The stream closes after run_finished, so the whole body is readable.
    let body = body_text(response).await;
    let names: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .collect();
    assert_eq!(names.first(), Some(&"run_started"));
    assert_eq!(names.last(), Some(&"run_finished"));
    assert_eq!(names.iter().filter(|name| **name == "item_saved").count(), 2);
    assert!(body.contains(r#""event_type":"run_finished""#));
}

#[tokio::test]
async fn texture_history_follows_identity_crawls() {
    let app = TestApp::with_players(1);
    let id = subject(1);

    app.post_json("/api/v1/crawl/identity/run", json!({})).await;
    app.identity
        .set_profile(&id, "Player1", Some("http://textures/skin-new"));
    app.clock.advance(Duration::hours(12));
    app.post_json("/api/v1/crawl/identity/run", json!({})).await;

    // Dashed ids are normalised.
    let dashed = "00000000-0000-0000-0000-000000000001";
    let response = app
        .get(&format!("/api/v1/subjects/{dashed}/textures/skin"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["subject_id"], id.as_str());
    assert_eq!(body["slot"], "skin");
    let urls: Vec<&str> = body["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, vec!["http://textures/skin-new", "http://textures/skin-1"]);

    let capes =
        body_json(app.get(&format!("/api/v1/subjects/{id}/textures/cape")).await)
            .await;
    assert_eq!(capes["history"], json!([]));
}

#[tokio::test]
async fn texture_history_rejects_bad_parameters() {
    let app = TestApp::with_players(1);

    let response = app.get("/api/v1/subjects/not-a-uuid/textures/skin").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(&format!("/api/v1/subjects/{}/textures/hat", subject(1)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn leaderboard_first_load_then_cached() {
    let app = TestApp::with_players(3);
    let key = LeaderboardKey::new("wins_bedwars", "bedwars");
    app.stats
        .set_leaders(&key, vec![subject(3), subject(1), subject(2)]);

    let response = app.get("/api/v1/leaderboards/bedwars/wins_bedwars").await;
    assert_eq!(response.status(), StatusCode::OK);
    let first = body_json(response).await;
    assert_eq!(first["scope"], "bedwars");
    assert_eq!(first["stat"], "wins_bedwars");
    let names: Vec<&str> = first["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["display_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Player3", "Player1", "Player2"]);
    assert_eq!(first["rows"][0]["value"], 30.0);
    assert_eq!(first["rows"][0]["rank"], 1);

    let second =
        body_json(app.get("/api/v1/leaderboards/bedwars/wins_bedwars").await).await;
    assert_eq!(second, first);
    assert_eq!(
        app.stats
            .leader_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn leaderboard_first_load_failure_is_a_bad_gateway() {
    let app = TestApp::with_players(1);
    app.stats.fail_leaders();

    let response = app.get("/api/v1/leaderboards/bedwars/wins_bedwars").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"]["status"], 502);
}

#[tokio::test]
async fn scheduler_tick_respects_the_autosync_lease() {
    let app = TestApp::with_players(2);
    let runs = &app.state.stores.runs;
    let leases = &app.state.stores.leases;
    let now = app.clock.now();

    assert!(
        leases
            .try_acquire(AUTOSYNC_LEASE, now, now + Duration::hours(1))
            .await
            .unwrap()
    );
    run_scheduled_sync(&app.state).await;
    assert!(runs.recent("stats", 10).await.unwrap().is_empty());
    assert!(runs.recent("identity", 10).await.unwrap().is_empty());

    leases.release(AUTOSYNC_LEASE).await.unwrap();
    run_scheduled_sync(&app.state).await;
    assert_eq!(runs.recent("stats", 10).await.unwrap().len(), 1);
    assert_eq!(runs.recent("identity", 10).await.unwrap().len(), 1);
    // The lease is handed back once the tick is over.
    assert!(
        leases
            .try_acquire(AUTOSYNC_LEASE, now, now + Duration::hours(1))
            .await
            .unwrap()
    );
}
