//! Bounded upstream downloads
//!
//! Two modes share one client:
//! - buffered: the whole body is read into memory for transformation, no
//!   client headers are forwarded and anything but a 2xx is an error
//! - streaming: client headers are forwarded, a fixed set of upstream
//!   headers plus the upstream status and body are relayed as-is
//!
//! Both refuse a declared `Content-Length` above the size limit before any
//! body bytes are read. The configured timeout bounds connection setup
//! only. There are no retries.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Response, StatusCode, header};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Upstream response headers relayed in streaming mode
pub const RELAYED_RESPONSE_HEADERS: [HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(String),

    #[error("connection timeout")]
    Timeout,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("non-2xx response code: {0}")]
    Status(StatusCode),

    #[error("file too big: {size} (max: {max})")]
    TooBig { size: u64, max: u64 },

    #[error("incomplete download: size: {size}, content-length: {declared}")]
    Incomplete { size: u64, declared: u64 },

    #[error("failed to read body: {0}")]
    Body(String),
}

impl FetchError {
    fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_builder() {
            FetchError::InvalidUrl(err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Fetcher limits
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_bytes: u64,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            connect_timeout: Duration::from_secs(10),
            user_agent: "mediator".to_string(),
        }
    }
}

impl From<&crate::config::DownloadConfig> for FetchConfig {
    fn from(download: &crate::config::DownloadConfig) -> Self {
        Self {
            max_bytes: download.max_size.as_u64(),
            connect_timeout: download.timeout(),
            user_agent: download.user_agent.clone(),
        }
    }
}

/// A fully buffered upstream response
#[derive(Debug, Clone)]
pub struct DownloadedResource {
    pub original_url: String,
    /// Last URL after following redirects
    pub final_url: String,
    pub content_type: Option<String>,
    /// `Content-Length` as declared by the upstream, 0 when absent
    pub declared_length: u64,
    pub status: StatusCode,
    pub body: Bytes,
}

impl DownloadedResource {
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

/// Upstream response whose body has not been read yet
#[derive(Debug)]
pub struct UpstreamStream {
    pub final_url: String,
    pub status: StatusCode,
    pub declared_length: u64,
    response: reqwest::Response,
}

impl UpstreamStream {
    /// Relays the upstream into a response. `headers` holds values the caller
    /// already decided on; relayed headers never replace them.
    pub fn into_response(self, mut headers: HeaderMap) -> Response<Body> {
        for name in RELAYED_RESPONSE_HEADERS {
            if headers.contains_key(&name) {
                continue;
            }
            if let Some(value) = self.response.headers().get(&name) {
                headers.insert(name, value.clone());
            }
        }

        let url = self.final_url;
        let stream = self.response.bytes_stream().inspect(move |chunk| {
            // Headers are already on the wire; the client sees a truncated body.
            if let Err(err) = chunk {
                warn!(url = %url, error = %err, "Upstream stream aborted");
            }
        });
        let body = Body::from_stream(stream);

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

/// Upstream HTTP client
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    /// Create a new fetcher
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Downloads the whole body without forwarding any client headers
    pub async fn fetch_buffered(&self, url: &str) -> Result<DownloadedResource> {
        debug!(url, "Downloading file");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_send)?;

        let declared = check_declared_length(response.headers(), self.config.max_bytes)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let mut body = BytesMut::with_capacity(declared.min(self.config.max_bytes) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?
        {
            let size = (body.len() + chunk.len()) as u64;
            if size > self.config.max_bytes {
                return Err(FetchError::TooBig {
                    size,
                    max: self.config.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let size = body.len() as u64;
        // Some servers omit Content-Length; an empty body is never a success.
        // A connection closed short of Content-Length already failed as `Body`.
        if size == 0 || (declared > 0 && declared != size) {
            return Err(FetchError::Incomplete { size, declared });
        }

        debug!(url, final_url = %final_url, size, "Download completed");

        Ok(DownloadedResource {
            original_url: url.to_string(),
            final_url,
            content_type,
            declared_length: declared,
            status,
            body: body.freeze(),
        })
    }

    /// Sends the request with every client header except `Host` and hands
    /// back the unread response for relaying
    pub async fn fetch_streaming(&self, url: &str, client_headers: &HeaderMap) -> Result<UpstreamStream> {
        debug!(url, "Proxying file");

        let mut forwarded = client_headers.clone();
        forwarded.remove(header::HOST);

        let response = self
            .client
            .get(url)
            .headers(forwarded)
            .send()
            .await
            .map_err(FetchError::from_send)?;

        let declared = check_declared_length(response.headers(), self.config.max_bytes)?;

        Ok(UpstreamStream {
            final_url: response.url().to_string(),
            status: response.status(),
            declared_length: declared,
            response,
        })
    }
}

/// Parses `Content-Length` (unparseable counts as 0) and enforces the limit
pub fn check_declared_length(headers: &HeaderMap, max_bytes: u64) -> Result<u64> {
    let size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    if size > max_bytes {
        return Err(FetchError::TooBig {
            size,
            max: max_bytes,
        });
    }

    Ok(size)
}
