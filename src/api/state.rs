use std::sync::Arc;

use crate::config::Config;
use crate::fetch::{FetchConfig, FetchError, Fetcher};
use crate::imaging::{ExporterRegistry, OperationRegistry, Pipeline};
use crate::signature::SignatureVerifier;
use crate::source::SourceTable;

/// Everything handlers share. Built once at startup and never mutated.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sources: Arc<SourceTable>,
    pub verifier: Arc<SignatureVerifier>,
    pub fetcher: Fetcher,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, FetchError> {
        let fetcher = Fetcher::new(FetchConfig::from(&config.download))?;

        Ok(Self {
            sources: Arc::new(SourceTable::from_config(&config)),
            verifier: Arc::new(SignatureVerifier::new(&config.security.secret_key)),
            fetcher,
            pipeline: Arc::new(Pipeline::new(
                OperationRegistry::with_max_output_pixels(config.transform.max_output_pixels),
                ExporterRegistry::with_defaults(),
            )),
            config: Arc::new(config),
        })
    }

    /// Configured bearer token, `None` when auth is off
    pub fn auth_token(&self) -> Option<&str> {
        Some(self.config.security.auth_token.as_str()).filter(|token| !token.is_empty())
    }
}
