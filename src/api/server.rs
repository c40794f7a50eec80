use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{Router, http::header, middleware, routing::get};
use tokio::net::TcpListener;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tracing::{info, warn};

use super::{
    middleware::{log_requests, require_bearer, set_cache_control, verify_signature},
    services::{health, not_found, proxy, render, root, transform},
    state::AppState,
};
use crate::config::Config;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Assembles the gateway routes.
///
/// Transform and proxy run auth, then signature verification; render does
/// neither. All three get `Cache-Control` on success and live under the
/// configured path prefix. `/` and `/health` are never prefixed.
pub fn build_router(state: AppState) -> Router {
    let signed = Router::new()
        .route("/image/transform/{source}/{*path}", get(transform))
        .route("/proxy/{source}/{*path}", get(proxy))
        .route_layer(middleware::from_fn_with_state(state.clone(), verify_signature))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let gateway = Router::new()
        .route("/render/{renderer}/{payload}", get(render))
        .merge(signed)
        .route_layer(middleware::from_fn_with_state(state.clone(), set_cache_control));

    let prefix = state.config.server.path_prefix.clone();
    let routes = if prefix.is_empty() {
        gateway
    } else {
        Router::new().nest(&prefix, gateway)
    };

    routes
        .route("/", get(root))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(middleware::from_fn(log_requests))
        .layer(SetSensitiveRequestHeadersLayer::new([header::AUTHORIZATION]))
        .with_state(state)
}

/// Loads state from `config` and serves until Ctrl+C or SIGTERM
pub async fn run(config: Config) -> Result<(), AnyError> {
    let address = config.server.bind_addr;
    let grace = config.server.shutdown_grace();

    info!(
        sources = config.sources.len(),
        renderers = config.renderers.len(),
        prefix = %config.server.path_prefix,
        signed = !config.security.secret_key.is_empty(),
        auth = !config.security.auth_token.is_empty(),
        max_download = %config.download.max_size,
        "Starting mediator"
    );

    let state = AppState::new(config)?;
    let app = build_router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Mediator listening");

    serve(listener, app, grace, shutdown_signal()).await?;
    info!("Server stopped");

    Ok(())
}

/// Serves `app` until `shutdown` resolves, then gives in-flight requests
/// at most `grace` to finish
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    grace: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stopping_tx, stopping_rx) = tokio::sync::oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        let _ = stopping_tx.send(());
    };

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(signal)
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = stopping_rx => {}
    }

    info!(grace_secs = grace.as_secs(), "Draining in-flight requests");
    match tokio::time::timeout(grace, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Shutdown grace period elapsed, dropping open connections");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
