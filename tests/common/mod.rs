//! Shared fixtures: a throwaway upstream and a gateway wired to it

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Response, StatusCode, Uri, header},
    response::IntoResponse,
    routing::get,
};
use http_body_util::BodyExt;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;

use mediator::api::{AppState, build_router};
use mediator::config::{Config, SourceConfig};

pub const PNG_WIDTH: u32 = 64;
pub const PNG_HEIGHT: u32 = 32;

/// Upstream server on an ephemeral port that counts every request it sees
pub struct Upstream {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));

        let app = Router::new()
            .route("/img/{*path}", get(serve_file))
            .route("/render", get(serve_render))
            .with_state(hits.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind upstream");
        let address = listener.local_addr().expect("Upstream has no address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Upstream crashed");
        });

        Self {
            base_url: format!("http://{address}"),
            hits,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// One source (`cdn`) and one renderer (`docs`), both pointing here
    pub fn config(&self) -> Config {
        Config {
            sources: vec![SourceConfig::new("cdn", format!("{}/img", self.base_url))],
            renderers: vec![SourceConfig::new(
                "docs",
                format!("{}/render?url=%s", self.base_url),
            )],
            ..Config::default()
        }
    }
}

/// Routes files by name:
/// - `pixel.png`: a PNG_WIDTH x PNG_HEIGHT gradient
/// - `notes.txt`: plain text
/// - `missing.png`: 404
/// - `empty.png`: 200 with no body
/// - anything else: echoes path, query and `x-test` as `application/octet-stream`
async fn serve_file(
    State(hits): State<Arc<AtomicUsize>>,
    Path(path): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response<Body> {
    hits.fetch_add(1, Ordering::SeqCst);

    match path.as_str() {
        "pixel.png" => ([(header::CONTENT_TYPE, "image/png")], png_fixture()).into_response(),
        "notes.txt" => ([(header::CONTENT_TYPE, "text/plain")], "just words").into_response(),
        "missing.png" => StatusCode::NOT_FOUND.into_response(),
        "empty.png" => ([(header::CONTENT_TYPE, "image/png")], Vec::<u8>::new()).into_response(),
        _ => {
            let marker = headers
                .get("x-test")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            let body = format!("{}|{}|{}", path, uri.query().unwrap_or(""), marker);
            ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response()
        }
    }
}

/// Stands in for a document renderer: echoes its query as a "PDF"
async fn serve_render(State(hits): State<Arc<AtomicUsize>>, uri: Uri) -> Response<Body> {
    hits.fetch_add(1, Ordering::SeqCst);
    let body = uri.query().unwrap_or("").to_string();
    ([(header::CONTENT_TYPE, "application/pdf")], body).into_response()
}

pub fn png_fixture() -> Vec<u8> {
    let pixels = image::RgbImage::from_fn(PNG_WIDTH, PNG_HEIGHT, |x, y| {
        image::Rgb([(x * 4) as u8, (y * 8) as u8, 128])
    });

    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .expect("Failed to encode PNG fixture");
    out.into_inner()
}

pub fn gateway(config: Config) -> Router {
    let state = AppState::new(config).expect("Failed to build app state");
    build_router(state)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Body is not JSON")
}
