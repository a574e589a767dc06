//! Configuration for statsync.
//!
//! [`ConfigLoader`] composes a [`Config`] from built-in defaults, an optional
//! `statsync.toml`, a `.env` file and the process environment, then runs the
//! guard rails in [`validation`]. Fatal problems are [`ConfigLoadError`]s;
//! everything else comes back as [`ConfigWarnings`] for the caller to log.

#![allow(missing_docs)]

pub mod error;
pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use error::ConfigLoadError;
pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    Config, ConfigMetadata, DatabaseConfig, RateLimitConfig, ServerConfig,
    UpstreamConfig,
};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
