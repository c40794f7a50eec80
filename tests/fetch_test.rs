mod common;

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::Upstream;
use mediator::fetch::{FetchConfig, FetchError, Fetcher};

fn fetcher(max_bytes: u64) -> Fetcher {
    Fetcher::new(FetchConfig {
        max_bytes,
        ..FetchConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_buffered_download() {
    let upstream = Upstream::start().await;
    let url = format!("{}/img/pixel.png", upstream.base_url);

    let resource = fetcher(1024 * 1024).fetch_buffered(&url).await.unwrap();

    assert_eq!(resource.status, StatusCode::OK);
    assert_eq!(resource.content_type.as_deref(), Some("image/png"));
    assert_eq!(resource.size(), common::png_fixture().len());
    assert_eq!(resource.declared_length, resource.size() as u64);
    assert_eq!(resource.final_url, url);
}

#[tokio::test]
async fn test_buffered_rejects_oversized_body() {
    let upstream = Upstream::start().await;
    let url = format!("{}/img/pixel.png", upstream.base_url);

    let err = fetcher(16).fetch_buffered(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::TooBig { max: 16, .. }));
}

#[tokio::test]
async fn test_buffered_rejects_empty_body() {
    let upstream = Upstream::start().await;
    let url = format!("{}/img/empty.png", upstream.base_url);

    let err = fetcher(1024).fetch_buffered(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::Incomplete { size: 0, .. }));
}

/// Serves one response declaring `declared` bytes but sending only `body`,
/// then closes the connection
async fn short_body_upstream(declared: usize, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{address}/short.png")
}

#[tokio::test]
async fn test_buffered_rejects_truncated_body() {
    let url = short_body_upstream(100, b"0123456789").await;

    // The connection closes before Content-Length bytes arrive, which the
    // client reports while reading the body
    let err = fetcher(1024).fetch_buffered(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::Body(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_buffered_rejects_non_2xx() {
    let upstream = Upstream::start().await;
    let url = format!("{}/img/missing.png", upstream.base_url);

    let err = fetcher(1024).fetch_buffered(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(StatusCode::NOT_FOUND)));
}

#[tokio::test]
async fn test_streaming_relays_non_2xx_and_forwards_headers() {
    let upstream = Upstream::start().await;
    let client = fetcher(1024);

    let stream = client
        .fetch_streaming(
            &format!("{}/img/missing.png", upstream.base_url),
            &HeaderMap::new(),
        )
        .await
        .unwrap();
    assert_eq!(stream.status, StatusCode::NOT_FOUND);

    let mut headers = HeaderMap::new();
    headers.insert("x-test", HeaderValue::from_static("relayed"));
    headers.insert(header::HOST, HeaderValue::from_static("ignored.test"));

    let stream = client
        .fetch_streaming(&format!("{}/img/echo.bin", upstream.base_url), &headers)
        .await
        .unwrap();
    let response = stream.into_response(HeaderMap::new());

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let body = common::body_bytes(response).await;
    assert_eq!(body, b"echo.bin||relayed");
}

#[tokio::test]
async fn test_streaming_checks_declared_length() {
    let upstream = Upstream::start().await;
    let url = format!("{}/img/pixel.png", upstream.base_url);

    let err = fetcher(16)
        .fetch_streaming(&url, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TooBig { .. }));
}
