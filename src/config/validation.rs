use super::models::{Config, SourceConfig};
use std::collections::HashSet;
use thiserror::Error;

/// Renderer URLs carry exactly one of these, replaced by the escaped payload URL
pub const RENDERER_PLACEHOLDER: &str = "%s";

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{table} entry has an empty name")]
    EmptyName { table: &'static str },

    #[error("{table} name '{name}' is defined more than once")]
    DuplicateName { table: &'static str, name: String },

    #[error("{table} '{name}' must use an http/https url, got '{url}'")]
    InvalidUrl {
        table: &'static str,
        name: String,
        url: String,
    },

    #[error("renderer '{name}' url must contain exactly one '%s' placeholder")]
    InvalidRendererTemplate { name: String },

    #[error("download.max_size must be positive")]
    InvalidMaxSize,

    #[error("download.timeout_secs must be positive")]
    InvalidTimeout,

    #[error("transform.max_output_pixels must be positive")]
    InvalidMaxOutputPixels,

    #[error("cache.cache_control '{0}' is not a valid header value")]
    InvalidCacheControl(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_table("source", &config.sources)?;
    validate_table("renderer", &config.renderers)?;
    validate_renderer_templates(&config.renderers)?;
    validate_limits(config)?;
    validate_cache_control(&config.cache.cache_control)?;
    Ok(())
}

/// Trims trailing slashes so `base + "/" + path` never doubles them
pub fn normalize(config: &mut Config) {
    for source in &mut config.sources {
        let trimmed = source.url.trim_end_matches('/').len();
        source.url.truncate(trimmed);
    }
    config.server.path_prefix = normalize_path_prefix(&config.server.path_prefix);
}

/// `media/` -> `/media`, `/` -> ``
pub fn normalize_path_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }

    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn validate_table(table: &'static str, entries: &[SourceConfig]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for entry in entries {
        if entry.name.trim().is_empty() {
            return Err(ValidationError::EmptyName { table });
        }

        if !seen.insert(entry.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                table,
                name: entry.name.clone(),
            });
        }

        if !entry.url.starts_with("http://") && !entry.url.starts_with("https://") {
            return Err(ValidationError::InvalidUrl {
                table,
                name: entry.name.clone(),
                url: entry.url.clone(),
            });
        }
    }

    Ok(())
}

fn validate_renderer_templates(renderers: &[SourceConfig]) -> Result<(), ValidationError> {
    for renderer in renderers {
        if renderer.url.matches(RENDERER_PLACEHOLDER).count() != 1 {
            return Err(ValidationError::InvalidRendererTemplate {
                name: renderer.name.clone(),
            });
        }
    }
    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    if config.download.max_size.as_u64() == 0 {
        return Err(ValidationError::InvalidMaxSize);
    }
    if config.download.timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout);
    }
    if config.transform.max_output_pixels == 0 {
        return Err(ValidationError::InvalidMaxOutputPixels);
    }
    Ok(())
}

fn validate_cache_control(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || axum::http::HeaderValue::from_str(value).is_err() {
        return Err(ValidationError::InvalidCacheControl(value.to_string()));
    }
    Ok(())
}
