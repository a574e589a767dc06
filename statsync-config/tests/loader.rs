use std::fs;
use std::time::Duration;

use statsync_config::{ConfigLoadError, ConfigLoader, EnvConfig};
use tempfile::TempDir;

fn loader_in(dir: &TempDir) -> ConfigLoader {
    // A missing env file keeps the process environment untouched.
    ConfigLoader::new().with_env_file(dir.path().join("absent.env"))
}

#[test]
fn file_values_are_overridden_by_the_environment() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("statsync.toml");
    fs::write(
        &path,
        r#"
        [server]
        host = "127.0.0.1"
        port = 4000

        [database]
        url = "postgres://file/statsync"
        max_connections = 4

        [upstream]
        stats_api_key = "from-file"
        request_timeout = "3s"

        [rate_limit.stats]
        max_tokens = 200
        window = "5m"
        safety_margin = "2s"

        [crawler]
        default_limit = 20
        default_sleep_ms = 500

        [leaderboard]
        freshness_secs = 600
        "#,
    )
    .unwrap();

    let env = EnvConfig {
        server_port: Some(5000),
        stats_api_key: Some("from-env".into()),
        scheduler_enabled: Some(false),
        ..EnvConfig::default()
    };
    let load = loader_in(&dir)
        .with_config_path(&path)
        .with_env(env)
        .load()
        .unwrap();
    let config = load.config;

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 5000);
    assert_eq!(config.database.url.as_deref(), Some("postgres://file/statsync"));
    assert_eq!(config.database.max_connections, 4);
    assert_eq!(config.upstream.stats_api_key.as_deref(), Some("from-env"));
    assert_eq!(config.upstream.request_timeout, Duration::from_secs(3));
    assert_eq!(config.rate_limit.stats.max_tokens, 200);
    assert_eq!(config.rate_limit.stats.window_secs, 300);
    assert_eq!(config.rate_limit.stats.safety_margin_ms, 2_000);
    assert_eq!(config.rate_limit.identity.max_tokens, 500);
    assert_eq!(config.crawler.default_limit, 20);
    assert_eq!(config.crawler.default_min_age_minutes, 360);
    assert!(!config.crawler.scheduler_enabled);
    assert_eq!(config.leaderboard.freshness_secs, 600);
    assert_eq!(config.leaderboard.max_rows, 25);
    assert_eq!(config.metadata.config_path.as_deref(), Some(path.as_path()));
    assert!(load.warnings.is_empty());
}

#[test]
fn defaults_apply_without_a_file_and_warn() {
    let dir = TempDir::new().unwrap();
    let load = loader_in(&dir).with_env(EnvConfig::default()).load().unwrap();

    assert_eq!(load.config.server.port, 3000);
    assert!(load.config.database.url.is_none());
    assert!(load.config.upstream.secondary_cape_template.is_some());
    let messages: Vec<_> = load.warnings.iter().map(|w| w.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("No statsync.toml")));
    assert!(messages.iter().any(|m| m.contains("STATS_API_KEY")));
    assert!(messages.iter().any(|m| m.contains("in-memory")));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = loader_in(&dir)
        .with_config_path(dir.path().join("nope.toml"))
        .with_env(EnvConfig::default())
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn config_path_from_environment_is_honoured() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[server]\nport = 7777\n").unwrap();

    let load = loader_in(&dir)
        .with_env(EnvConfig {
            config_path: Some(path),
            ..EnvConfig::default()
        })
        .load()
        .unwrap();

    assert_eq!(load.config.server.port, 7777);
}

#[test]
fn malformed_toml_reports_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("statsync.toml");
    fs::write(&path, "[server\nport = ").unwrap();

    let err = loader_in(&dir)
        .with_config_path(&path)
        .with_env(EnvConfig::default())
        .load()
        .unwrap_err();

    match err {
        ConfigLoadError::Parse { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn guard_rails_reject_and_warn() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("statsync.toml");

    fs::write(&path, "[rate_limit.identity]\nwindow = \"0s\"\n").unwrap();
    let err = loader_in(&dir)
        .with_config_path(&path)
        .with_env(EnvConfig::default())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::GuardRail(_)));

    fs::write(
        &path,
        "[rate_limit.stats]\nmax_tokens = 1000\n\n[crawler]\ndefault_sleep_ms = 0\n",
    )
    .unwrap();
    let load = loader_in(&dir)
        .with_config_path(&path)
        .with_env(EnvConfig {
            stats_api_key: Some("key".into()),
            database_url: Some("postgres://localhost/statsync".into()),
            ..EnvConfig::default()
        })
        .load()
        .unwrap();
    let messages: Vec<_> = load.warnings.iter().map(|w| w.message.clone()).collect();
    assert_eq!(messages.len(), 2, "{messages:?}");
    assert!(messages[0].contains("default_sleep_ms"));
    assert!(messages[1].contains("provider ceiling"));
}
