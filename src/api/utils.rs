//! API utility functions
//!
//! Pure helpers for reconstructing what the client asked for.

use axum::http::{HeaderMap, HeaderName, Uri, header};
use std::net::SocketAddr;

use crate::signature::strip_signature;

/// Reads a header as a string, treating non-ASCII values as absent
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `https` when a proxy in front says so, otherwise `http`
pub fn request_scheme(headers: &HeaderMap) -> &'static str {
    match headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok()) {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    }
}

/// `scheme://host`, host taken from the `Host` header or the URI authority
pub fn request_origin(headers: &HeaderMap, uri: &Uri) -> String {
    let host = header_str(headers, &header::HOST)
        .map(str::to_owned)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();

    format!("{}://{}", request_scheme(headers), host)
}

/// Full URL as seen by the client with any signature parameter removed
pub fn request_url(headers: &HeaderMap, uri: &Uri) -> String {
    let origin = request_origin(headers, uri);
    match strip_signature(uri.query()).query {
        Some(query) => format!("{origin}{}?{query}", uri.path()),
        None => format!("{origin}{}", uri.path()),
    }
}

/// First `X-Forwarded-For` hop, else the peer address
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_str(headers, &HeaderName::from_static("x-forwarded-for"))
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}
