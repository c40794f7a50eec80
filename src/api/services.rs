use axum::{
    Json,
    body::Body,
    extract::{FromRequestParts, OriginalUri, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header, request::Parts},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    error::ApiError,
    models::{HealthResponse, RenderPayload, RootResponse},
    state::AppState,
    utils::header_str,
};
use crate::cache::{fingerprint_render, fingerprint_transform, is_not_modified};
use crate::imaging::{ImageFormat, TransformOptions};
use crate::source::{ResolvedTarget, assemble_renderer_url};

/// Resolves `{source}/{*path}` against the source table. Unknown sources
/// are rejected here, before any handler work.
impl FromRequestParts<AppState> for ResolvedTarget {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Path((source, path)) = Path::<(String, String)>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

        Ok(state.sources.resolve(&source, &path)?)
    }
}

/// Image transform endpoint (GET /image/transform/{source}/{*path})
///
/// ## Flow:
/// 1. Parse options from the (signature-free) query and `Accept`
/// 2. Reject unknown operations or missing parameters before fetching
/// 3. Answer 304 when `If-None-Match` carries the request's ETag
/// 4. Download the source fully, bounded by the size limit
/// 5. Map the upstream `Content-Type` to an image type, else 422
/// 6. Run the operation chain off the async runtime
/// 7. Respond with the encoded bytes, ETag and `Vary: Accept` if negotiated
pub async fn transform(
    State(state): State<AppState>,
    target: ResolvedTarget,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let accept = header_str(&headers, &header::ACCEPT);
    let mut options = TransformOptions::from_query(uri.query(), accept);
    state.pipeline.validate(&options)?;

    let negotiated = options.is_negotiated();
    let etag = fingerprint_transform(&target.resolved_url, &options);
    if is_not_modified(&headers, &etag) {
        info!(etag = %etag, source = %target.source_name, "ETag match");
        return not_modified(&etag, negotiated);
    }

    let resource = state.fetcher.fetch_buffered(&target.resolved_url).await?;

    let content_type = resource.content_type.as_deref().unwrap_or_default();
    let source_format = ImageFormat::from_mime(content_type).ok_or_else(|| {
        ApiError::Unprocessable(format!("Unsupported image format: {content_type}"))
    })?;
    if options.format.is_none() {
        options.format = Some(source_format);
    }

    debug!(
        url = %resource.final_url,
        size = resource.size(),
        operations = ?options.operations,
        format = ?options.format,
        "Transforming image"
    );

    let pipeline = Arc::clone(&state.pipeline);
    let body = resource.body;
    let artifact = tokio::task::spawn_blocking(move || pipeline.transform(&body, &mut options))
        .await
        .map_err(|e| ApiError::Internal(format!("transform task failed: {e}")))??;

    let mut response = Response::new(Body::from(artifact.bytes));
    let response_headers = response.headers_mut();
    response_headers.insert(header::ETAG, etag_value(&etag)?);
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(artifact.mime_type),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(artifact.size));
    if negotiated {
        response_headers.insert(header::VARY, HeaderValue::from_static("Accept"));
    }

    Ok(response)
}

/// Passthrough endpoint (GET /proxy/{source}/{*path})
///
/// Forwards client headers and the query string, relays status and body.
pub async fn proxy(
    State(state): State<AppState>,
    target: ResolvedTarget,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let url = target.url_with_query(uri.query());
    debug!(url = %url, "Proxying file");

    let upstream = state.fetcher.fetch_streaming(&url, &headers).await?;
    Ok(upstream.into_response(HeaderMap::new()))
}

/// Document render endpoint (GET /render/{renderer}/{payload})
///
/// The payload is base64url JSON naming the document; its URL is substituted
/// into the renderer's template and the client's query is appended.
pub async fn render(
    State(state): State<AppState>,
    Path((renderer, encoded)): Path<(String, String)>,
    OriginalUri(original): OriginalUri,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let payload = RenderPayload::decode(&encoded)?;

    let etag = fingerprint_render(&original.to_string());
    if is_not_modified(&headers, &etag) {
        info!(etag = %etag, renderer = %renderer, "ETag match");
        return not_modified(&etag, false);
    }

    let template = state.sources.renderer_template(&renderer)?;
    let url = assemble_renderer_url(template, &payload.url, uri.query())?;
    debug!(renderer = %renderer, url = %url, "Rendering file");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ETAG, etag_value(&etag)?);
    if let Some(disposition) = payload.content_disposition() {
        let value = HeaderValue::from_str(&disposition)
            .map_err(|_| ApiError::BadRequest("invalid filename".to_string()))?;
        response_headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let upstream = state.fetcher.fetch_streaming(&url, &headers).await?;
    Ok(upstream.into_response(response_headers))
}

/// Liveness (GET /)
pub async fn root() -> impl IntoResponse {
    Json(RootResponse {
        message: "hello, world".to_string(),
    })
}

/// Health check endpoint (GET /health)
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

fn etag_value(etag: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(etag).map_err(|e| ApiError::Internal(format!("invalid etag: {e}")))
}

fn not_modified(etag: &str, negotiated: bool) -> Result<Response, ApiError> {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    response.headers_mut().insert(header::ETAG, etag_value(etag)?);
    if negotiated {
        response
            .headers_mut()
            .insert(header::VARY, HeaderValue::from_static("Accept"));
    }
    Ok(response)
}
