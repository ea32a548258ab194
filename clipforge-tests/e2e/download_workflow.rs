//! Exact wire-shape scenarios for format listing and download failures.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use clipforge_core::job::JobOrchestrator;
use clipforge_core::mux::{FfmpegMuxer, StreamMuxer};
use clipforge_core::resolver::{AuthContext, SimulationResolver};
use clipforge_core::store::ArtifactStore;
use clipforge_web::{AppState, build_router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

fn app_with_muxer(muxer: Arc<dyn StreamMuxer>, dir: &std::path::Path) -> Router {
    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::new(SimulationResolver::new()),
        muxer,
        ArtifactStore::new(dir),
        AuthContext::default(),
    ));
    build_router(AppState {
        orchestrator,
        cookie_jar: dir.join("cookies.txt"),
    })
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn formats_listing_returns_exact_descriptor_shape() {
    let dir = TempDir::new().unwrap();
    let app = app_with_muxer(Arc::new(clipforge_core::mux::SimulationMuxer::new()), dir.path());

    let (status, value) =
        post_json(app, "/formats", json!({"url": "https://example.com/v"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value,
        json!({
            "ok": true,
            "formats": [{
                "id": "18",
                "resolution": "360p",
                "fps": 30,
                "filesize": 1_048_576,
                "ext": "mp4",
                "type": "both"
            }]
        })
    );
}

#[tokio::test]
async fn download_with_missing_ffmpeg_fails_fast_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store_dir = dir.path().join("store");
    let muxer = Arc::new(FfmpegMuxer::new("/nonexistent/bin/ffmpeg"));
    let app = app_with_muxer(muxer, &store_dir);

    let (status, value) = post_json(
        app,
        "/download",
        json!({
            "url": "https://example.com/v",
            "format_id": "18",
            "output_filename": "clip"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value, json!({"error": "FFmpeg not found. Cannot proceed."}));

    // the tool check precedes all I/O, so the store was never touched
    assert!(!store_dir.exists());
}
