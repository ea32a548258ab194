//! Download handler: runs one job and streams the artifact back.

use std::path::Path;

use axum::body::Body;
use axum::extract::{Json, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use clipforge_core::job::JobRequest;
use clipforge_core::mux::TrimRange;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::error;

use crate::server::AppState;

/// Body of `POST /download`. Fields default to empty so a missing field is
/// rejected by request validation with a JSON error rather than a
/// deserialization failure.
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub output_filename: String,
    #[serde(default)]
    pub trim_start: Option<String>,
    #[serde(default)]
    pub trim_end: Option<String>,
}

pub async fn download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Response {
    // both-or-neither: a single trim bound degrades to no trimming
    let trim = TrimRange::from_bounds(request.trim_start.as_deref(), request.trim_end.as_deref());

    let job = JobRequest {
        source_url: request.url,
        format_id: request.format_id,
        output_name: request.output_filename,
        trim,
    };

    match state.orchestrator.run_job(&job).await {
        Ok(path) => serve_artifact(&path).await,
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// Stream a finished artifact as an attachment.
///
/// Retrieval does not delete the file; the reaper owns its lifetime. If a
/// sweep races us mid-stream the client sees a truncated transfer.
async fn serve_artifact(path: &Path) -> Response {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            // the job reported success, so this is not a caller mistake
            error!("Failed to open artifact {}: {e}", path.display());
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        }
    };

    let length = file.metadata().await.ok().map(|m| m.len());
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download.mp4");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        );
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap()
}
