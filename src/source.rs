//! Maps source and renderer names from the request path to upstream URLs

use std::collections::HashMap;
use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::config::{Config, RENDERER_PLACEHOLDER, SourceConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("source not found: {0}")]
    UnknownSource(String),
    #[error("renderer not supported: {0}")]
    UnknownRenderer(String),
    #[error("invalid upstream url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Upstream location for one request, derived from a source and the path tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub source_name: String,
    pub request_path: String,
    pub resolved_url: String,
}

impl ResolvedTarget {
    /// Appends the client's (already signature-free) query string
    pub fn url_with_query(&self, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.resolved_url, q),
            _ => self.resolved_url.clone(),
        }
    }
}

/// Read-only name tables built once at startup
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    sources: HashMap<String, String>,
    renderers: HashMap<String, String>,
}

impl SourceTable {
    pub fn new(sources: &[SourceConfig], renderers: &[SourceConfig]) -> Self {
        let index = |entries: &[SourceConfig]| {
            entries
                .iter()
                .map(|entry| (entry.name.clone(), entry.url.clone()))
                .collect()
        };

        Self {
            sources: index(sources),
            renderers: index(renderers),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.sources, &config.renderers)
    }

    pub fn source_url(&self, name: &str) -> Result<&str, SourceError> {
        self.sources
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SourceError::UnknownSource(name.to_string()))
    }

    pub fn renderer_template(&self, name: &str) -> Result<&str, SourceError> {
        self.renderers
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SourceError::UnknownRenderer(name.to_string()))
    }

    /// `baseURL + "/" + escaped(path)`, escaping each segment on its own
    pub fn resolve(&self, source: &str, path: &str) -> Result<ResolvedTarget, SourceError> {
        let base = self.source_url(source)?;

        Ok(ResolvedTarget {
            source_name: source.to_string(),
            request_path: path.to_string(),
            resolved_url: format!("{}/{}", base, escape_path(path)),
        })
    }
}

/// Percent-escapes every `/`-separated segment independently
pub fn escape_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Fills the renderer template with the query-escaped payload URL, then
/// appends the client's query parameters after any the template already has.
/// Duplicate keys are kept, never overwritten.
pub fn assemble_renderer_url(
    template: &str,
    payload_url: &str,
    client_query: Option<&str>,
) -> Result<String, SourceError> {
    let escaped: String = form_urlencoded::byte_serialize(payload_url.as_bytes()).collect();
    let filled = template.replacen(RENDERER_PLACEHOLDER, &escaped, 1);

    let mut url = Url::parse(&filled).map_err(|e| SourceError::InvalidUrl {
        url: filled.clone(),
        reason: e.to_string(),
    })?;

    let extra: Vec<(String, String)> = client_query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    if !extra.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &extra {
            pairs.append_pair(key, value);
        }
    }

    Ok(url.into())
}
