//! Preview API integration tests
//!
//! Runs the real router (in-process via axum-test) against a local upstream
//! HTTP server, so fetch, transform, persistence and caching are exercised
//! end to end.

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use axum_test::TestServer;
use bytes::Bytes;
use image::{GenericImageView, ImageEncoder, RgbImage, codecs::jpeg::JpegEncoder};
use rstest::rstest;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use image_previewer::{
    services::{HttpFetcher, ImageTransformer, PreviewCache, PreviewService},
    storage::PreviewStorage,
    web::{AppState, Readiness, WebServer},
};

#[derive(Clone)]
struct Upstream {
    hits: Arc<AtomicUsize>,
    jpeg: Bytes,
}

fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Vec::new();
    JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

async fn serve_jpeg(State(upstream): State<Upstream>) -> impl IntoResponse {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "image/jpeg")], upstream.jpeg.clone())
}

async fn serve_text(State(upstream): State<Upstream>) -> impl IntoResponse {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "text/plain")], "definitely not a jpeg")
}

async fn serve_versioned(
    State(upstream): State<Upstream>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    if query.get("v").map(String::as_str) == Some("2") {
        ([(header::CONTENT_TYPE, "image/jpeg")], upstream.jpeg.clone()).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn serve_protected(State(upstream): State<Upstream>, headers: HeaderMap) -> impl IntoResponse {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    match headers.get("x-api-key") {
        Some(key) if key == "secret" => {
            ([(header::CONTENT_TYPE, "image/jpeg")], upstream.jpeg.clone()).into_response()
        }
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

async fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = Upstream {
        hits: hits.clone(),
        jpeg: Bytes::from(gradient_jpeg(256, 192)),
    };
    let app = Router::new()
        .route("/images/gopher.jpg", get(serve_jpeg))
        .route("/text.txt", get(serve_text))
        .route("/versioned.jpg", get(serve_versioned))
        .route("/protected.jpg", get(serve_protected))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

struct Harness {
    server: TestServer,
    service: PreviewService,
    readiness: Readiness,
    upstream: SocketAddr,
    upstream_hits: Arc<AtomicUsize>,
    cache_dir: TempDir,
}

impl Harness {
    async fn new(capacity: usize) -> Self {
        let (upstream, upstream_hits) = spawn_upstream().await;
        let cache_dir = tempfile::tempdir().unwrap();
        let service = PreviewService::new(
            Arc::new(PreviewCache::new(capacity)),
            PreviewStorage::open(cache_dir.path()).await.unwrap(),
            Arc::new(
                HttpFetcher::with_timeouts(Duration::from_secs(2), Duration::from_secs(5), 1 << 20)
                    .unwrap(),
            ),
            Arc::new(ImageTransformer::with_quality(80)),
        );
        let readiness = Readiness::new();
        let app = WebServer::create_router(AppState::new(service.clone(), readiness.clone()));

        Self {
            server: TestServer::new(app).unwrap(),
            service,
            readiness,
            upstream,
            upstream_hits,
            cache_dir,
        }
    }

    fn preview_path(&self, mode: &str, width: &str, height: &str, target: &str) -> String {
        format!("/{mode}/{width}/{height}/{}{target}", self.upstream)
    }

    fn upstream_hits(&self) -> usize {
        self.upstream_hits.load(Ordering::SeqCst)
    }

    fn cached_files(&self) -> usize {
        std::fs::read_dir(self.cache_dir.path()).unwrap().count()
    }
}

fn decoded_dimensions(body: &[u8]) -> (u32, u32) {
    image::load_from_memory_with_format(body, image::ImageFormat::Jpeg)
        .unwrap()
        .dimensions()
}

#[tokio::test]
async fn test_fill_returns_exact_dimensions() {
    let harness = Harness::new(5).await;

    let response = harness
        .server
        .get(&harness.preview_path("fill", "333", "666", "/images/gopher.jpg"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let body = response.as_bytes();
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        body.len().to_string().as_str()
    );
    assert_eq!(decoded_dimensions(body), (333, 666));
}

#[tokio::test]
async fn test_resize_returns_exact_dimensions() {
    let harness = Harness::new(5).await;

    let response = harness
        .server
        .get(&harness.preview_path("resize", "111", "222", "/images/gopher.jpg"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(decoded_dimensions(response.as_bytes()), (111, 222));
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let harness = Harness::new(5).await;
    let path = harness.preview_path("fill", "120", "80", "/images/gopher.jpg");

    let first = harness.server.get(&path).await;
    let second = harness.server.get(&path).await;

    assert_eq!(first.status_code(), StatusCode::OK);
    assert_eq!(second.status_code(), StatusCode::OK);
    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!(harness.upstream_hits(), 1);
    assert_eq!(harness.cached_files(), 1);
}

#[tokio::test]
async fn test_invalid_mode_is_rejected_before_fetching() {
    let harness = Harness::new(5).await;

    let response = harness
        .server
        .get(&harness.preview_path("stretch", "100", "100", "/images/gopher.jpg"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "unsupported crop mode: stretch\n");
    assert_eq!(harness.upstream_hits(), 0);
}

#[tokio::test]
async fn test_invalid_dimensions_are_rejected_before_fetching() {
    let harness = Harness::new(5).await;

    for (width, height) in [("abc", "100"), ("100", "0"), ("-1", "100")] {
        let response = harness
            .server
            .get(&harness.preview_path("fill", width, height, "/images/gopher.jpg"))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(harness.upstream_hits(), 0);
}

#[tokio::test]
async fn test_non_image_upstream_is_a_bad_gateway() {
    let harness = Harness::new(5).await;

    let response = harness
        .server
        .get(&harness.preview_path("fill", "100", "100", "/text.txt"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.text(),
        "failed to fetch image: got not supported content type: text/plain\n"
    );
    assert!(harness.service.cache().is_empty().await);
    assert_eq!(harness.cached_files(), 0);
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_bad_gateway() {
    let harness = Harness::new(5).await;
    let closed_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let response = harness
        .server
        .get(&format!("/fill/100/100/127.0.0.1:{closed_port}/images/gopher.jpg"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    assert!(response.text().starts_with("failed to fetch image:"));
    assert!(harness.service.cache().is_empty().await);
    assert_eq!(harness.cached_files(), 0);
}

#[tokio::test]
async fn test_oversized_output_is_a_bad_gateway() {
    let harness = Harness::new(5).await;

    let response = harness
        .server
        .get(&harness.preview_path("resize", "111111", "2", "/images/gopher.jpg"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.text(),
        "failed to crop image: jpeg: image is too large to encode\n"
    );
    assert_eq!(harness.cached_files(), 0);
}

#[rstest]
#[case("resize")]
#[case("fill")]
#[tokio::test]
async fn test_in_range_but_huge_output_is_a_bad_gateway(#[case] mode: &str) {
    let harness = Harness::new(5).await;

    let response = harness
        .server
        .get(&harness.preview_path(mode, "60000", "60000", "/images/gopher.jpg"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.text(),
        "failed to crop image: jpeg: image is too large to encode\n"
    );
    assert_eq!(harness.cached_files(), 0);

    // The server is still up and serving
    let response = harness
        .server
        .get(&harness.preview_path("fill", "10", "10", "/images/gopher.jpg"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_upstream_image_is_a_bad_gateway() {
    let harness = Harness::new(5).await;

    let response = harness
        .server
        .get(&harness.preview_path("fill", "10", "10", "/nope.jpg"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.text(),
        "failed to fetch image: upstream responded with status 404\n"
    );
}

#[tokio::test]
async fn test_query_string_reaches_upstream() {
    let harness = Harness::new(5).await;

    let response = harness
        .server
        .get(&harness.preview_path("fill", "50", "50", "/versioned.jpg"))
        .add_query_param("v", "2")
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(decoded_dimensions(response.as_bytes()), (50, 50));
}

#[tokio::test]
async fn test_client_headers_are_forwarded_upstream() {
    let harness = Harness::new(5).await;
    let path = harness.preview_path("fill", "40", "40", "/protected.jpg");

    let denied = harness.server.get(&path).await;
    let allowed = harness
        .server
        .get(&path)
        .add_header(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static("secret"),
        )
        .await;

    assert_eq!(denied.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(allowed.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_lru_eviction_deletes_files() {
    let harness = Harness::new(2).await;

    for size in ["10", "20", "30"] {
        let response = harness
            .server
            .get(&harness.preview_path("fill", size, size, "/images/gopher.jpg"))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    assert_eq!(harness.service.cache().len().await, 2);
    assert_eq!(harness.cached_files(), 2);
    assert_eq!(harness.service.cache().stats().await.evictions, 1);
}

#[tokio::test]
async fn test_readiness_endpoint_reflects_server_state() {
    let harness = Harness::new(5).await;

    let response = harness.server.get("/ready").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    harness.readiness.mark_ready();
    let response = harness.server.get("/ready").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "ready\n");

    harness.readiness.mark_not_ready();
    let response = harness.server.get("/ready").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_reports_cache_stats() {
    let harness = Harness::new(3).await;
    let path = harness.preview_path("resize", "64", "64", "/images/gopher.jpg");
    harness.server.get(&path).await;
    harness.server.get(&path).await;

    let response = harness.server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache"]["capacity"], 3);
    assert_eq!(body["cache"]["entries"], 1);
    assert_eq!(body["cache"]["hits"], 1);
    assert_eq!(body["in_flight"], 0);
}
