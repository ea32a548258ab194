//! Façade behavior: payload shapes, status codes, and the cookie upload.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use clipforge_core::job::JobOrchestrator;
use clipforge_core::mux::SimulationMuxer;
use clipforge_core::resolver::{AuthContext, SimulationResolver};
use clipforge_core::store::ArtifactStore;
use clipforge_web::{AppState, build_router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

fn test_app(resolver: SimulationResolver, muxer: SimulationMuxer, dir: &Path) -> Router {
    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::new(resolver),
        Arc::new(muxer),
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
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_check_reports_healthy() {
    let dir = TempDir::new().unwrap();
    let app = test_app(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/.well-known/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(
        serde_json::from_slice::<Value>(&bytes).unwrap(),
        json!({"status": "healthy"})
    );
}

#[tokio::test]
async fn formats_failure_uses_tagged_error_shape() {
    let dir = TempDir::new().unwrap();
    let app = test_app(
        SimulationResolver::new().listing_fails(),
        SimulationMuxer::new(),
        dir.path(),
    );

    let (status, value) =
        post_json(app, "/formats", json!({"url": "https://example.com/v"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["ok"], json!(false));
    assert!(value["error"].as_str().unwrap().contains("simulated"));
    assert!(value.get("formats").is_none());
}

#[tokio::test]
async fn formats_rejects_invalid_url() {
    let dir = TempDir::new().unwrap();
    let app = test_app(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

    let (status, value) = post_json(app, "/formats", json!({"url": "not a url"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["ok"], json!(false));
    assert!(value["error"].as_str().unwrap().contains("invalid request"));
}

#[tokio::test]
async fn download_streams_artifact_as_attachment() {
    let dir = TempDir::new().unwrap();
    let app = test_app(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/download")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "url": "https://example.com/v",
                        "format_id": "18",
                        "output_filename": "clip"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "video/mp4"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"clip.mp4\""
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(!bytes.is_empty());

    // retrieval must not delete the artifact; the reaper owns its lifetime
    assert!(dir.path().join("clip.mp4").exists());
    assert!(!dir.path().join("clip_video.mp4").exists());
    assert!(!dir.path().join("clip_audio.m4a").exists());
}

#[tokio::test]
async fn download_with_missing_fields_is_a_400() {
    let dir = TempDir::new().unwrap();
    let app = test_app(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

    let (status, value) = post_json(app, "/download", json!({"url": "https://example.com/v"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(value["error"].as_str().unwrap().contains("format_id"));
}

#[tokio::test]
async fn download_rejects_traversal_output_name() {
    let dir = TempDir::new().unwrap();
    let app = test_app(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

    let (status, value) = post_json(
        app,
        "/download",
        json!({
            "url": "https://example.com/v",
            "format_id": "18",
            "output_filename": "../escape"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(value["error"].as_str().unwrap().contains("unsafe"));
}

#[tokio::test]
async fn upload_cookies_persists_to_jar() {
    let dir = TempDir::new().unwrap();
    let app = test_app(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

    let boundary = "clipforge-test-boundary";
    let cookie_lines = "# Netscape HTTP Cookie File\n.example.com\tTRUE\t/\tFALSE\t0\tsid\tabc\n";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"cookies\"; filename=\"cookies.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {cookie_lines}\r\n\
         --{boundary}--\r\n"
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-cookies")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let saved = std::fs::read_to_string(dir.path().join("cookies.txt")).unwrap();
    assert_eq!(saved, cookie_lines);
}

#[tokio::test]
async fn upload_cookies_without_field_is_a_400() {
    let dir = TempDir::new().unwrap();
    let app = test_app(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

    let boundary = "clipforge-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"unrelated\"\r\n\r\n\
         data\r\n\
         --{boundary}--\r\n"
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-cookies")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!dir.path().join("cookies.txt").exists());
}
