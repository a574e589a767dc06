//! # Statsync Server
//!
//! Serves the crawl triggers, leaderboard and texture history reads, and
//! runs the periodic sync scheduler.
//!
//! ```text
//! statsync-server                      # serve (default)
//! statsync-server serve --port 8080
//! statsync-server db migrate
//! statsync-server crawl stats --limit 10 --sleep-ms 500
//! ```

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statsync_config::{Config, ConfigLoad, ConfigLoader};
use statsync_core::{
    crawler::{ALREADY_RUNNING, CrawlRequest},
    database,
};
use statsync_server::{
    AppState, CrawlJobKind, create_app,
    infra::startup::{BackgroundTasks, shutdown_signal},
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "statsync-server")]
#[command(about = "Rate limited game-profile sync: crawlers, leaderboards and their HTTP triggers")]
struct Cli {
    /// Path to statsync.toml (overrides STATSYNC_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server and scheduler (default)
    Serve(ServeArgs),
    #[command(subcommand)]
    Db(DbCommand),
    /// Run one crawl batch in the foreground and print its report
    Crawl(CrawlArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[derive(ClapArgs, Debug)]
struct CrawlArgs {
    /// Which crawler to run
    #[arg(value_parser = ["stats", "identity"])]
    job: String,

    /// Maximum subjects to process (1..=250)
    #[arg(long)]
    limit: Option<u32>,

    /// Only subjects whose newest snapshot is older than this
    #[arg(long)]
    min_age_minutes: Option<u32>,

    /// Pause after every item (0..=5000)
    #[arg(long)]
    sleep_ms: Option<u64>,

    /// Persist every event of the run
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(cli.config.clone())?;

    match cli.command {
        None => run_server(config, ServeArgs::default()).await,
        Some(Command::Serve(args)) => run_server(config, args).await,
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate(&config).await,
        Some(Command::Crawl(args)) => run_crawl(&config, args).await,
    }
}

fn load_runtime_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Crawl and leaderboard summaries stay visible. Override via RUST_LOG.
                "info,crawl=info,leaderboard=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    Ok(config)
}

async fn run_server(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let state = AppState::from_config(&config).await?;
    let background = BackgroundTasks::spawn(&state);
    let app = create_app(state.clone());

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "statsync server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    background.shutdown(state).await;
    info!("statsync server stopped");
    Ok(())
}

async fn run_db_migrate(config: &Config) -> anyhow::Result<()> {
    let url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL (or [database].url) is required for db migrate")?;
    let pool = database::connect(url, config.database.max_connections)
        .await
        .context("failed to connect to PostgreSQL for migrations")?;
    database::migrate(&pool)
        .await
        .context("database migration failed")?;
    Ok(())
}

async fn run_crawl(config: &Config, args: CrawlArgs) -> anyhow::Result<()> {
    let job: CrawlJobKind = args.job.parse()?;
    let state = AppState::from_config(config).await?;
    let recorder = BackgroundTasks::recorder_only(&state);

    let request = CrawlRequest {
        limit: args.limit,
        min_age_minutes: args.min_age_minutes,
        sleep_ms: args.sleep_ms,
        verbose: args.verbose.then_some(true),
    };
    let report = state.run_crawl(job, request).await?;
    recorder.shutdown(state).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    match report.error.as_deref() {
        None | Some(ALREADY_RUNNING) => Ok(()),
        Some(message) => bail!("{job} crawl failed: {message}"),
    }
}
