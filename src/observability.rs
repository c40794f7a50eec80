//! Tracing setup

use tracing_subscriber::EnvFilter;

/// Maps `LOG_LEVEL` (debug|info|warn|error) to a filter directive
pub fn level_directive(level: Option<&str>) -> &'static str {
    match level.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("debug") => "debug",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

/// JSON logs to stdout. `RUST_LOG` wins over `LOG_LEVEL`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").ok();
        EnvFilter::new(level_directive(level.as_deref()))
    });

    tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_env_filter(filter)
        .init();
}
