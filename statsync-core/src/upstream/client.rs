use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use super::rate_limit::{RateLimitPolicy, RateWindow, Reservation};
use crate::clock::Clock;
use crate::error::{Result, SyncError};

pub const DEFAULT_API_KEY_HEADER: &str = "API-Key";
const REMAINING_HEADER: &str = "RateLimit-Remaining";
const RESET_HEADER: &str = "RateLimit-Reset";

#[derive(Clone, Debug)]
struct CachedResponse {
    body: Value,
    stored_at: DateTime<Utc>,
    /// End of the revalidate window the body was stored under.
    expires_at: DateTime<Utc>,
}

/// HTTP client for one upstream provider. Every request first takes a token
/// from the client's [`RateWindow`]; an exhausted window is absorbed as a
/// sleep and never surfaced to callers.
pub struct RateLimitedClient {
    name: String,
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<(String, String)>,
    window: Mutex<RateWindow>,
    clock: Arc<dyn Clock>,
    cache: DashMap<String, CachedResponse>,
}

impl fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field(
                "api_key",
                &self.api_key.as_ref().map(|(header, _)| {
                    format!("{header}: <redacted>")
                }),
            )
            .field("policy", self.window.lock().policy())
            .finish()
    }
}

impl RateLimitedClient {
    pub fn new(
        name: impl Into<String>,
        base_url: Url,
        policy: RateLimitPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            http: reqwest::Client::new(),
            base_url,
            api_key: None,
            window: Mutex::new(RateWindow::new(policy, now)),
            clock,
            cache: DashMap::new(),
        }
    }

    /// Attaches the credential sent with every request. Blank keys are
    /// ignored so an unset environment variable doesn't send an empty header.
    pub fn with_api_key(
        mut self,
        header: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.api_key = Some((header.into(), key));
        }
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Current `(remaining, reset_at)` of the local window.
    pub fn window_state(&self) -> (u32, DateTime<Utc>) {
        let window = self.window.lock();
        (window.remaining(), window.reset_at())
    }

    /// GETs `path` (resolved against the base URL) and returns the JSON body.
    ///
    /// With `revalidate = Some(age)`, a cached body younger than `age` is
    /// returned without contacting the provider or spending a token.
    pub async fn fetch_json(
        &self,
        path: &str,
        revalidate: Option<Duration>,
    ) -> Result<Value> {
        let url = self.resolve(path)?;
        let cache_key = url.as_str().to_string();

        if let Some(max_age) = revalidate
            && let Some(cached) = self.cached(&cache_key, max_age)
        {
            trace!(target: "upstream", client = %self.name, path, "served from revalidate cache");
            return Ok(cached);
        }

        self.acquire_token().await;

        let mut request = self.http.get(url);
        if let Some((header, key)) = &self.api_key {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request.send().await.inspect_err(|err| {
            warn!(target: "upstream", client = %self.name, path, error = %err, "request failed");
        })?;

        let status = response.status();
        self.reconcile(response.headers());

        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = error_message(&body).unwrap_or_else(|| {
                format!("{} request failed with status {}", self.name, status)
            });
            warn!(
                target: "upstream",
                client = %self.name,
                path,
                status = status.as_u16(),
                %message,
                "provider returned an error"
            );
            return Err(SyncError::upstream(status.as_u16(), message));
        }

        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|err| {
            SyncError::Decode(format!("{} returned invalid JSON: {err}", self.name))
        })?;

        if let Some(max_age) = revalidate {
            self.store(cache_key, &body, max_age);
        }

        Ok(body)
    }

    pub async fn fetch<T>(
        &self,
        path: &str,
        revalidate: Option<Duration>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self.fetch_json(path, revalidate).await?;
        serde_json::from_value(value).map_err(|err| {
            SyncError::Decode(format!(
                "{} payload did not match the expected shape: {err}",
                self.name
            ))
        })
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|err| {
            SyncError::Internal(format!("invalid upstream path {path}: {err}"))
        })
    }

    fn cached(&self, key: &str, max_age: Duration) -> Option<Value> {
        let entry = self.cache.get(key)?;
        let age = (self.clock.now() - entry.stored_at).to_std().ok()?;
        (age < max_age).then(|| entry.body.clone())
    }

    /// Caches `body` and drops every entry whose own window has passed, so
    /// the map never outgrows the set of recently revalidated paths.
    fn store(&self, key: String, body: &Value, max_age: Duration) {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_add_signed(age))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.cache.retain(|_, cached| cached.expires_at > now);
        self.cache.insert(
            key,
            CachedResponse {
                body: body.clone(),
                stored_at: now,
                expires_at,
            },
        );
    }

    async fn acquire_token(&self) {
        loop {
            let reservation = self.window.lock().reserve(self.clock.now());
            match reservation {
                Reservation::Granted { remaining } => {
                    trace!(target: "upstream", client = %self.name, remaining, "token reserved");
                    return;
                }
                Reservation::Wait {
                    until,
                    window_reset_at,
                } => {
                    let wait = (until - self.clock.now())
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    debug!(
                        target: "upstream",
                        client = %self.name,
                        wait_ms = wait.as_millis() as u64,
                        "token budget exhausted, waiting for window reset"
                    );
                    tokio::time::sleep(wait).await;
                    self.window
                        .lock()
                        .expire(window_reset_at, self.clock.now());
                }
            }
        }
    }

    fn reconcile(&self, headers: &HeaderMap) {
        let remaining = header_number::<u32>(headers, REMAINING_HEADER);
        let reset = header_number::<u64>(headers, RESET_HEADER);
        if remaining.is_none() && reset.is_none() {
            return;
        }
        self.window.lock().reconcile(self.clock.now(), remaining, reset);
    }
}

fn header_number<T: std::str::FromStr>(
    headers: &HeaderMap,
    name: &str,
) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Pulls a human readable reason out of a provider error body.
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["cause", "errorMessage", "status_message", "error"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(
        server: &MockServer,
        policy: RateLimitPolicy,
        clock: Arc<dyn Clock>,
    ) -> RateLimitedClient {
        let base = Url::parse(&server.uri()).expect("mock uri");
        RateLimitedClient::new("stats", base, policy, clock)
            .with_api_key(DEFAULT_API_KEY_HEADER, "secret-key")
    }

    #[tokio::test]
    async fn sends_api_key_and_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/player"))
            .and(header("API-Key", "secret-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client(
            &server,
            RateLimitPolicy::default(),
            Arc::new(SystemClock),
        );
        let body = client
            .fetch_json("/v2/player?uuid=abc", None)
            .await
            .expect("fetch");
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn non_success_maps_to_upstream_error_with_provider_cause() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                json!({"success": false, "cause": "Invalid API key"}),
            ))
            .mount(&server)
            .await;

        let client = client(
            &server,
            RateLimitPolicy::default(),
            Arc::new(SystemClock),
        );
        let err = client
            .fetch_json("/v2/player", None)
            .await
            .expect_err("403 must fail");

        match err {
            SyncError::Upstream { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn headers_clamp_local_budget_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("RateLimit-Remaining", "3")
                    .insert_header("RateLimit-Reset", "900")
                    .set_body_json(json!({})),
            )
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::default());
        let client = client(&server, RateLimitPolicy::default(), clock.clone());
        client.fetch_json("/v2/player", None).await.expect("fetch");

        let (remaining, reset_at) = client.window_state();
        assert_eq!(remaining, 3);
        assert_eq!(reset_at, clock.now() + chrono::Duration::seconds(900));
    }

    #[tokio::test]
    async fn revalidate_hint_serves_cached_body_without_spending_a_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/leaderboards"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"n": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::default());
        let client = client(&server, RateLimitPolicy::default(), clock.clone());
        let hint = Some(Duration::from_secs(300));

        client.fetch_json("/v2/leaderboards", hint).await.expect("first");
        let (after_first, _) = client.window_state();

        clock.advance(chrono::Duration::seconds(60));
        let second =
            client.fetch_json("/v2/leaderboards", hint).await.expect("second");

        assert_eq!(second["n"], 1);
        assert_eq!(client.window_state().0, after_first);
    }

    #[tokio::test]
    async fn expired_cache_entries_are_dropped_on_the_next_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::default());
        let client = client(&server, RateLimitPolicy::default(), clock.clone());
        let hint = Some(Duration::from_secs(60));

        client.fetch_json("/v2/leaderboards?a", hint).await.expect("a");
        client.fetch_json("/v2/leaderboards?b", hint).await.expect("b");
        assert_eq!(client.cache.len(), 2);

        clock.advance(chrono::Duration::seconds(120));
        client.fetch_json("/v2/leaderboards?c", hint).await.expect("c");

        assert_eq!(client.cache.len(), 1);
        assert!(client.cache.contains_key(
            client.resolve("/v2/leaderboards?c").expect("url").as_str()
        ));
    }

    #[tokio::test]
    async fn exhausted_budget_waits_for_the_next_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let policy = RateLimitPolicy {
            max_tokens: 1,
            window_secs: 1,
            safety_margin_ms: 0,
        };
        let client = client(&server, policy, Arc::new(SystemClock));

        let started = std::time::Instant::now();
        client.fetch_json("/a", None).await.expect("first");
        client.fetch_json("/b", None).await.expect("second");

        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    #[test]
    fn debug_output_redacts_the_api_key() {
        let client = RateLimitedClient::new(
            "stats",
            Url::parse("https://api.example.net").expect("url"),
            RateLimitPolicy::default(),
            Arc::new(SystemClock),
        )
        .with_api_key("API-Key", "super-secret");

        let rendered = format!("{client:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
