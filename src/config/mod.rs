//! Configuration management for mediator
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. `MEDIATOR__<section>__<key>` environment variables
//! 4. Secrets and source tables from dedicated environment variables
//!
//! # Usage
//!
//! ```no_run
//! use mediator::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! - `MEDIATOR__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MEDIATOR__DOWNLOAD__MAX_SIZE=10MB`
//! - `MEDIATOR__CACHE__CACHE_CONTROL="public, max-age=600"`
//! - `MEDIATOR_SECRET_KEY`, `MEDIATOR_AUTH_TOKEN` (never read from the file)
//! - `MEDIATOR_SOURCES`, `MEDIATOR_RENDERERS` as JSON arrays of `{"name", "url"}`
//!
//! # Configuration File
//!
//! Loaded from `config/mediator.toml` unless `MEDIATOR_CONFIG` points elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    CacheConfig, Config, DownloadConfig, SecurityConfig, ServerConfig, SourceConfig,
    TransformConfig,
};
pub use sources::SourceLoadError;
pub use validation::{RENDERER_PLACEHOLDER, ValidationError, normalize_path_prefix};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] SourceLoadError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed, a source table in the
    /// environment is not valid JSON, or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`Config::load`], with an explicit file path taking precedence
    /// over `MEDIATOR_CONFIG`.
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::finish(sources::load(path)?)
    }

    /// Load configuration from a specific path, ignoring dedicated env vars
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        Self::finish(sources::load_from_sources(path)?)
    }

    fn finish(mut config: Config) -> Result<Self, ConfigError> {
        validation::validate(&config)?;
        validation::normalize(&mut config);
        Ok(config)
    }
}
