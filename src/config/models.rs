use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Named upstream origins for the transform and proxy routes
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Named URL templates for the render route
    #[serde(default)]
    pub renderers: Vec<SourceConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Mount point for every gateway route, e.g. `/media`
    #[serde(default)]
    pub path_prefix: String,
    /// How long in-flight requests may run after a shutdown signal
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            path_prefix: String::new(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

/// Upstream download limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    #[serde(default = "default_max_size")]
    pub max_size: ByteSize,
    /// Connect and TLS handshake timeout, not a deadline for the body
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_size() -> ByteSize {
    ByteSize::mb(50)
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "mediator".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_control: default_cache_control(),
        }
    }
}

fn default_cache_control() -> String {
    "public, max-age=31536000".to_string()
}

/// Image transform limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformConfig {
    /// Largest `w` x `h` area a transform may produce
    #[serde(default = "default_max_output_pixels")]
    pub max_output_pixels: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_output_pixels: default_max_output_pixels(),
        }
    }
}

fn default_max_output_pixels() -> u64 {
    crate::imaging::DEFAULT_MAX_OUTPUT_PIXELS
}

/// Shared secrets (loaded from environment, never from the config file)
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// HMAC key for request signatures; empty disables verification
    #[serde(skip)]
    pub secret_key: String,
    /// Bearer token; empty disables the auth check
    #[serde(skip)]
    pub auth_token: String,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret_key", &redact(&self.secret_key))
            .field("auth_token", &redact(&self.auth_token))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<unset>" } else { "<redacted>" }
}

/// A named upstream: `{"name": "images", "url": "https://cdn.example.com"}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}
