use std::{fmt, str::FromStr, sync::Arc};

use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

use statsync_config::Config;
use statsync_core::{
    Clock, SyncStores, SystemClock,
    crawler::{
        BatchCrawler, CrawlEventBus, CrawlRequest, CrawlSettings, CrawlerDeps,
        IdentityCrawlJob, IdentityCrawler, RunHandle, StatsCrawlJob,
        StatsCrawler,
    },
    database,
    leaderboard::{LeaderboardCache, LeaderboardSettings},
    locks::LockCoordinator,
    snapshots::SnapshotStore,
    types::RunReport,
    upstream::{
        HypixelStatsApi, IdentityApi, MojangIdentityApi, RateLimitedClient,
        StatsApi, TextureProbe,
    },
};

/// The two crawler instantiations reachable from the trigger surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CrawlJobKind {
    Stats,
    Identity,
}

impl CrawlJobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlJobKind::Stats => StatsCrawlJob::NAME,
            CrawlJobKind::Identity => IdentityCrawlJob::NAME,
        }
    }
}

impl fmt::Display for CrawlJobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown crawl job '{0}', expected stats or identity")]
pub struct UnknownJob(pub String);

impl FromStr for CrawlJobKind {
    type Err = UnknownJob;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            StatsCrawlJob::NAME => Ok(Self::Stats),
            IdentityCrawlJob::NAME => Ok(Self::Identity),
            other => Err(UnknownJob(other.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub stores: SyncStores,
    pub stats_crawler: Arc<StatsCrawler>,
    pub identity_crawler: Arc<IdentityCrawler>,
    pub leaderboards: Arc<LeaderboardCache>,
    pub snapshots: SnapshotStore,
    pub locks: LockCoordinator,
    pub bus: CrawlEventBus,
    pub crawl_settings: CrawlSettings,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires every component over `stores`. Both crawlers and the leaderboard
    /// cache share one event bus, one lock coordinator and one clock.
    pub fn from_parts(
        stores: SyncStores,
        stats: Arc<dyn StatsApi>,
        identity: Arc<dyn IdentityApi>,
        clock: Arc<dyn Clock>,
        crawl_settings: CrawlSettings,
        leaderboard_settings: LeaderboardSettings,
    ) -> Self {
        let bus = CrawlEventBus::new(crawl_settings.event_bus_capacity);
        let deps = CrawlerDeps::from_stores(&stores, bus.clone(), clock.clone());
        let locks = deps.locks.clone();
        let snapshots = deps.store.clone();

        let stats_crawler = Arc::new(BatchCrawler::new(
            StatsCrawlJob::new(
                Arc::clone(&stats),
                crawl_settings.min_populated_fields,
            ),
            deps.clone(),
            crawl_settings.clone(),
        ));
        let identity_crawler = Arc::new(BatchCrawler::new(
            IdentityCrawlJob::new(identity),
            deps,
            crawl_settings.clone(),
        ));
        let leaderboards = Arc::new(LeaderboardCache::new(
            Arc::clone(&stores.leaderboards),
            stats,
            locks.clone(),
            clock,
            leaderboard_settings,
        ));

        Self {
            stores,
            stats_crawler,
            identity_crawler,
            leaderboards,
            snapshots,
            locks,
            bus,
            crawl_settings,
        }
    }

    /// Production wiring: Postgres when a database URL is configured (after
    /// applying migrations), otherwise in-memory backends, plus HTTP clients
    /// for both providers.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let stores = match config.database.url.as_deref() {
            Some(url) => {
                let pool =
                    database::connect(url, config.database.max_connections)
                        .await
                        .context("failed to connect to PostgreSQL")?;
                database::migrate(&pool)
                    .await
                    .context("failed to apply database migrations")?;
                SyncStores::postgres(pool)
            }
            None => {
                warn!(
                    "no database configured; running on in-memory backends, locks are process-local"
                );
                SyncStores::in_memory()
            }
        };

        let upstream = &config.upstream;
        let http = reqwest::Client::builder()
            .timeout(upstream.request_timeout)
            .user_agent(concat!("statsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let mut stats_client = RateLimitedClient::new(
            StatsCrawlJob::NAME,
            upstream.stats_base_url.clone(),
            config.rate_limit.stats,
            clock.clone(),
        )
        .with_http_client(http.clone());
        if let Some(key) = &upstream.stats_api_key {
            stats_client = stats_client.with_api_key(&upstream.api_key_header, key);
        }

        let identity_client = RateLimitedClient::new(
            IdentityCrawlJob::NAME,
            upstream.identity_base_url.clone(),
            config.rate_limit.identity,
            clock.clone(),
        )
        .with_http_client(http);

        let probe = upstream
            .secondary_cape_template
            .as_deref()
            .map(|template| TextureProbe::new(template, upstream.request_timeout))
            .transpose()
            .context("failed to build secondary texture probe")?;

        info!(
            stats = %upstream.stats_base_url,
            identity = %upstream.identity_base_url,
            probe = probe.is_some(),
            "upstream clients configured"
        );

        Ok(Self::from_parts(
            stores,
            Arc::new(HypixelStatsApi::new(Arc::new(stats_client))),
            Arc::new(MojangIdentityApi::new(Arc::new(identity_client), probe)),
            clock,
            config.crawler.clone(),
            config.leaderboard.clone(),
        ))
    }

    pub async fn run_crawl(
        &self,
        job: CrawlJobKind,
        request: CrawlRequest,
    ) -> statsync_core::Result<RunReport> {
        match job {
            CrawlJobKind::Stats => self.stats_crawler.run_batch(request).await,
            CrawlJobKind::Identity => {
                self.identity_crawler.run_batch(request).await
            }
        }
    }

    pub fn start_crawl(&self, job: CrawlJobKind, request: CrawlRequest) -> RunHandle {
        match job {
            CrawlJobKind::Stats => self.stats_crawler.start(request),
            CrawlJobKind::Identity => self.identity_crawler.start(request),
        }
    }

    pub async fn queue_size(
        &self,
        job: CrawlJobKind,
        min_age_minutes: u32,
    ) -> statsync_core::Result<u32> {
        match job {
            CrawlJobKind::Stats => {
                self.stats_crawler.queue_size(min_age_minutes).await
            }
            CrawlJobKind::Identity => {
                self.identity_crawler.queue_size(min_age_minutes).await
            }
        }
    }
}
