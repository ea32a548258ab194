//! JSON API handlers: health, format listing, cookie upload.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use clipforge_core::resolver::FormatDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::server::AppState;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}

#[derive(Debug, Deserialize)]
pub struct FormatsRequest {
    #[serde(default)]
    pub url: String,
}

/// Tagged result shape for format listings: either `{ok, formats}` or
/// `{ok, error}`, always with HTTP 200.
#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<FormatDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FormatsResponse {
    fn success(formats: Vec<FormatDescriptor>) -> Self {
        Self {
            ok: true,
            formats: Some(formats),
            error: None,
        }
    }

    fn failure(error: String) -> Self {
        Self {
            ok: false,
            formats: None,
            error: Some(error),
        }
    }
}

pub async fn list_formats(
    State(state): State<AppState>,
    Json(request): Json<FormatsRequest>,
) -> Json<FormatsResponse> {
    match state.orchestrator.list_formats(&request.url).await {
        Ok(formats) => Json(FormatsResponse::success(formats)),
        Err(e) => Json(FormatsResponse::failure(e.to_string())),
    }
}

/// Persist an uploaded cookie export to the configured jar path. The jar is
/// consumed by the resolver on subsequent jobs.
pub async fn upload_cookies(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("malformed multipart body: {e}")})),
                )
                    .into_response();
            }
        };

        if field.name() != Some("cookies") {
            continue;
        }

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("failed to read cookies field: {e}")})),
                )
                    .into_response();
            }
        };

        if let Err(e) = tokio::fs::write(&state.cookie_jar, &bytes).await {
            error!(
                "Failed to persist cookie jar {}: {e}",
                state.cookie_jar.display()
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        }

        info!(
            "Cookie jar updated ({} bytes) at {}",
            bytes.len(),
            state.cookie_jar.display()
        );
        return Json(json!({"ok": true})).into_response();
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "multipart field 'cookies' is required"})),
    )
        .into_response()
}
