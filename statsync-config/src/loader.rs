use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use statsync_core::upstream::{
    DEFAULT_API_KEY_HEADER, DEFAULT_SECONDARY_CAPE_TEMPLATE, RateLimitPolicy,
};
use tracing::debug;
use url::Url;

use crate::error::ConfigLoadError;
use crate::models::{
    Config, ConfigMetadata, DEFAULT_DATABASE_MAX_CONNECTIONS,
    DEFAULT_IDENTITY_BASE_URL, DEFAULT_STATS_BASE_URL, DatabaseConfig,
    RateLimitConfig, ServerConfig, UpstreamConfig,
};
use crate::sources::{EnvConfig, FileConfig, FileRateLimitPolicy, FileUpstreamConfig};
use crate::validation::{self, ConfigWarnings};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["statsync.toml", "config/statsync.toml"];
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Replaces the process environment; mainly for tests.
    pub env: Option<EnvConfig>,
}

/// Composes [`Config`] from, lowest precedence first: built-in defaults, the
/// TOML file, the environment (after `.env` has been loaded).
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let env = self.options.env.clone().unwrap_or_else(EnvConfig::gather);

        let (file_config, config_path) = self.load_file_config(&env)?;
        let config_present = file_config.is_some();

        let mut warnings = ConfigWarnings::default();
        if !config_present {
            warnings.push_with_hint(
                "No statsync.toml detected; using defaults and environment variables",
                "Pass --config or set STATSYNC_CONFIG to point at a configuration file",
            );
        }

        let config = compose_config(
            file_config.unwrap_or_default(),
            env,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )?;
        warnings.extend(validation::apply_guard_rails(&config)?);

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Explicit path, then `STATSYNC_CONFIG`, then the default locations. A
    /// missing file is an error only when it was asked for.
    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let requested = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match requested {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|source| {
            ConfigLoadError::Io {
                path: path.clone(),
                source,
            }
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "configuration file loaded");
        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        server: file_server,
        database: file_database,
        upstream: file_upstream,
        rate_limit: file_rate_limit,
        crawler: file_crawler,
        leaderboard: file_leaderboard,
    } = file;

    let server = ServerConfig {
        host: env
            .server_host
            .clone()
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(3000),
    };

    let database = DatabaseConfig {
        url: env
            .database_url
            .clone()
            .or(file_database.url)
            .filter(|url| !url.trim().is_empty()),
        max_connections: env
            .database_max_connections
            .or(file_database.max_connections)
            .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
    };

    let upstream = compose_upstream(file_upstream, &env)?;

    let rate_limit = RateLimitConfig {
        stats: compose_policy(
            RateLimitPolicy::stats_default(),
            file_rate_limit.stats,
            env.stats_max_tokens,
            ("rate_limit.stats.window", "rate_limit.stats.safety_margin"),
        )?,
        identity: compose_policy(
            RateLimitPolicy::identity_default(),
            file_rate_limit.identity,
            env.identity_max_tokens,
            (
                "rate_limit.identity.window",
                "rate_limit.identity.safety_margin",
            ),
        )?,
    };

    let mut crawler = file_crawler.unwrap_or_default();
    if let Some(verbose) = env.crawl_verbose {
        crawler.verbose = verbose;
    }
    if let Some(enabled) = env.scheduler_enabled {
        crawler.scheduler_enabled = enabled;
    }

    Ok(Config {
        server,
        database,
        upstream,
        rate_limit,
        crawler,
        leaderboard: file_leaderboard.unwrap_or_default(),
        metadata,
    })
}

fn compose_upstream(
    file: FileUpstreamConfig,
    env: &EnvConfig,
) -> Result<UpstreamConfig, ConfigLoadError> {
    let stats_base_url = parse_url(
        "stats_base_url",
        env.stats_base_url
            .as_deref()
            .or(file.stats_base_url.as_deref())
            .unwrap_or(DEFAULT_STATS_BASE_URL),
    )?;
    let identity_base_url = parse_url(
        "identity_base_url",
        env.identity_base_url
            .as_deref()
            .or(file.identity_base_url.as_deref())
            .unwrap_or(DEFAULT_IDENTITY_BASE_URL),
    )?;

    let secondary_cape_template = env
        .secondary_cape_template
        .clone()
        .or(file.secondary_cape_template)
        .unwrap_or_else(|| DEFAULT_SECONDARY_CAPE_TEMPLATE.to_string());
    let secondary_cape_template =
        Some(secondary_cape_template).filter(|template| !template.trim().is_empty());
    if let Some(template) = &secondary_cape_template
        && !template.contains("{name}")
    {
        return Err(ConfigLoadError::Upstream(anyhow::anyhow!(
            "secondary_cape_template '{template}' has no {{name}} placeholder"
        )));
    }

    let request_timeout = match file.request_timeout {
        Some(raw) => parse_duration("upstream.request_timeout", &raw)?,
        None => DEFAULT_REQUEST_TIMEOUT,
    };

    Ok(UpstreamConfig {
        stats_base_url,
        stats_api_key: env
            .stats_api_key
            .clone()
            .or(file.stats_api_key)
            .filter(|key| !key.trim().is_empty()),
        api_key_header: env
            .api_key_header
            .clone()
            .or(file.api_key_header)
            .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
        identity_base_url,
        secondary_cape_template,
        request_timeout,
    })
}

fn compose_policy(
    base: RateLimitPolicy,
    file: Option<FileRateLimitPolicy>,
    env_max_tokens: Option<u32>,
    (window_field, margin_field): (&'static str, &'static str),
) -> Result<RateLimitPolicy, ConfigLoadError> {
    let mut policy = base;

    if let Some(file) = file {
        if let Some(max_tokens) = file.max_tokens {
            policy.max_tokens = max_tokens;
        }
        if let Some(raw) = file.window {
            policy.window_secs = parse_duration(window_field, &raw)?.as_secs();
        }
        if let Some(raw) = file.safety_margin {
            policy.safety_margin_ms =
                parse_duration(margin_field, &raw)?.as_millis().min(u64::MAX as u128) as u64;
        }
    }
    if let Some(max_tokens) = env_max_tokens {
        policy.max_tokens = max_tokens;
    }

    Ok(policy)
}

fn parse_duration(field: &'static str, raw: &str) -> Result<Duration, ConfigLoadError> {
    humantime::parse_duration(raw.trim()).map_err(|source| {
        ConfigLoadError::InvalidDuration {
            field,
            value: raw.to_string(),
            source,
        }
    })
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigLoadError> {
    Url::parse(raw.trim())
        .with_context(|| format!("upstream.{field} '{raw}' is not a valid URL"))
        .map_err(ConfigLoadError::Upstream)
}
