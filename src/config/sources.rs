use super::models::{Config, SourceConfig};
use config::{Environment, File};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

const CONFIG_ENV_VAR: &str = "MEDIATOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mediator.toml";
const ENV_PREFIX: &str = "MEDIATOR";
const ENV_SEPARATOR: &str = "__";

const SECRET_KEY_ENV: &str = "MEDIATOR_SECRET_KEY";
const AUTH_TOKEN_ENV: &str = "MEDIATOR_AUTH_TOKEN";
const SOURCES_ENV: &str = "MEDIATOR_SOURCES";
const RENDERERS_ENV: &str = "MEDIATOR_RENDERERS";

#[derive(Debug, Error)]
pub enum SourceLoadError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(
        "{key}: expected a JSON array like [{{\"name\": \"source1\", \"url\": \"http://example.com\"}}]: {source}"
    )]
    InvalidTable {
        key: &'static str,
        source: serde_json::Error,
    },
}

/// Load configuration with priority (lowest to highest):
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. `MEDIATOR__SECTION__KEY` environment variables (including `.env`)
/// 4. Secrets and source tables from their dedicated variables
pub fn load(path_override: Option<PathBuf>) -> Result<Config, SourceLoadError> {
    let _ = dotenvy::dotenv();

    let config_path = path_override.unwrap_or_else(|| {
        env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    });

    let mut config = load_from_sources(config_path)?;
    apply_env(&mut config, |key| env::var(key).ok())?;

    Ok(config)
}

/// Load configuration from a specific path and `MEDIATOR__*` overrides only
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, SourceLoadError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // MEDIATOR__DOWNLOAD__MAX_SIZE -> download.max_size
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

/// Secrets are only ever read from the environment. Source tables may also
/// come from the environment as JSON arrays, replacing the file's tables.
fn apply_env<F>(config: &mut Config, lookup: F) -> Result<(), SourceLoadError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup(SECRET_KEY_ENV) {
        config.security.secret_key = secret;
    }
    if let Some(token) = lookup(AUTH_TOKEN_ENV) {
        config.security.auth_token = token;
    }

    if let Some(raw) = lookup(SOURCES_ENV) {
        config.sources = parse_table(SOURCES_ENV, &raw)?;
    }
    if let Some(raw) = lookup(RENDERERS_ENV) {
        config.renderers = parse_table(RENDERERS_ENV, &raw)?;
    }

    Ok(())
}

fn parse_table(key: &'static str, raw: &str) -> Result<Vec<SourceConfig>, SourceLoadError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let table: Vec<SourceConfig> = serde_json::from_str(raw)
        .map_err(|source| SourceLoadError::InvalidTable { key, source })?;

    tracing::debug!(key, entries = table.len(), "Parsed source table from environment");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8000");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
path_prefix = "/media"

[download]
max_size = "10MB"
timeout_secs = 3

[[sources]]
name = "images"
url = "https://cdn.example.com"

[[renderers]]
name = "pdf"
url = "https://render.example.com/preview?url=%s"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.path_prefix, "/media");
        assert_eq!(config.download.max_size.as_u64(), 10 * 1024 * 1024);
        assert_eq!(config.download.timeout_secs, 3);
        assert_eq!(
            config.sources,
            vec![SourceConfig::new("images", "https://cdn.example.com")]
        );
        assert_eq!(config.renderers[0].name, "pdf");
    }

    #[test]
    fn test_env_secrets_and_tables() {
        let mut config = Config::default();
        let lookup = lookup_from(&[
            (SECRET_KEY_ENV, "s3cret"),
            (AUTH_TOKEN_ENV, "token"),
            (
                SOURCES_ENV,
                r#" [{"name": "images", "url": "http://images.local"}] "#,
            ),
        ]);

        apply_env(&mut config, lookup).unwrap();

        assert_eq!(config.security.secret_key, "s3cret");
        assert_eq!(config.security.auth_token, "token");
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].url, "http://images.local");
        assert!(config.renderers.is_empty());
    }

    #[test]
    fn test_env_table_must_be_json_array() {
        let mut config = Config::default();
        let lookup = lookup_from(&[(RENDERERS_ENV, "pdf=http://render.local/%s")]);

        let err = apply_env(&mut config, lookup).unwrap_err();
        assert!(matches!(
            err,
            SourceLoadError::InvalidTable {
                key: RENDERERS_ENV,
                ..
            }
        ));
    }
}
