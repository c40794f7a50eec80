//! Request middleware: logging, bearer auth, signature checks and
//! cache headers

use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::{HeaderValue, StatusCode, Uri, header, uri::PathAndQuery};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use super::utils::{client_address, header_str, request_origin, request_url};
use crate::signature::{canonical_url, strip_signature};

const BEARER_PREFIX: &str = "Bearer ";

/// Emits exactly one event per request once the response is ready
pub async fn log_requests(req: Request, next: Next) -> Response {
    let started = Instant::now();

    let method = req.method().clone();
    let uri = original_uri(&req);
    let url = request_url(req.headers(), &uri);
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let remote_addr = client_address(req.headers(), peer);
    let user_agent = header_str(req.headers(), &header::USER_AGENT)
        .unwrap_or_default()
        .to_string();

    let span = info_span!("request", request_id = %Uuid::new_v4());
    let response = next.run(req).instrument(span.clone()).await;

    let resp_content_type = header_str(response.headers(), &header::CONTENT_TYPE).unwrap_or_default();
    span.in_scope(|| {
        info!(
            method = %method,
            url = %url,
            remote_addr = %remote_addr,
            user_agent = %user_agent,
            resp_content_type,
            status = response.status().as_u16(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Request"
        )
    });

    response
}

/// Requires `Authorization: Bearer <token>` when a token is configured.
/// The header is consumed here and never reaches an upstream.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.auth_token() else {
        return Ok(next.run(req).await);
    };

    let submitted = header_str(req.headers(), &header::AUTHORIZATION)
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    if !tokens_match(submitted, expected) {
        return Err(ApiError::Unauthorized);
    }

    req.headers_mut().remove(header::AUTHORIZATION);
    Ok(next.run(req).await)
}

/// Strips the signature parameter and, when a secret is configured, checks
/// it against the canonical form of the URL the client requested
pub async fn verify_signature(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let original = original_uri(&req);
    let stripped = strip_signature(original.query());

    if state.verifier.is_enabled() {
        let base = format!("{}{}", request_origin(req.headers(), &original), original.path());
        let canonical = canonical_url(&base, stripped.query.as_deref());
        state
            .verifier
            .verify(&canonical, stripped.signature.as_deref())?;
    }

    *req.uri_mut() = replace_query(req.uri(), stripped.query.as_deref())?;
    Ok(next.run(req).await)
}

/// Sets the configured `Cache-Control` on 200 responses only
pub async fn set_cache_control(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;

    if response.status() == StatusCode::OK {
        if let Ok(value) = HeaderValue::from_str(&state.config.cache.cache_control) {
            response.headers_mut().insert(header::CACHE_CONTROL, value);
        }
    }

    response
}

/// Full URI before any path prefix was stripped by nesting
fn original_uri(req: &Request) -> Uri {
    req.extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| req.uri().clone())
}

fn replace_query(uri: &Uri, query: Option<&str>) -> Result<Uri, ApiError> {
    let path_and_query = match query {
        Some(query) => format!("{}?{}", uri.path(), query),
        None => uri.path().to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse::<PathAndQuery>()
            .map_err(|e| ApiError::BadRequest(format!("invalid query: {e}")))?,
    );

    Uri::from_parts(parts).map_err(|e| ApiError::BadRequest(format!("invalid uri: {e}")))
}

/// Constant-time comparison of the SHA-256 digests of both tokens
fn tokens_match(submitted: &str, expected: &str) -> bool {
    let submitted = Sha256::digest(submitted.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    constant_time_eq(&submitted, &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b) {
        result |= x ^ y;
    }
    result == 0
}
