//! HTTP server wiring for Clipforge.
//!
//! Builds the production adapters from configuration, starts the store
//! reaper, and serves the JSON API until shutdown. Each request runs on its
//! own task; job state never crosses requests.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use clipforge_core::config::ClipforgeConfig;
use clipforge_core::job::JobOrchestrator;
use clipforge_core::mux::{FfmpegMuxer, StreamMuxer};
use clipforge_core::resolver::{AuthContext, YtDlpResolver, ensure_cookie_jar};
use clipforge_core::store::{ArtifactStore, spawn_reaper};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::handlers::{download, health_check, list_formats, upload_cookies};
use crate::static_files::index_page;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    /// Destination for uploaded cookie exports
    pub cookie_jar: PathBuf,
}

/// Assemble the route table for the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/.well-known/health", get(health_check))
        .route("/formats", post(list_formats))
        .route("/download", post(download))
        .route("/upload-cookies", post(upload_cookies))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the server until ctrl-c, then stop the reaper and return.
pub async fn run_server(config: ClipforgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = ArtifactStore::new(config.store.directory.clone());
    store.ensure_exists().await?;
    ensure_cookie_jar(&config.resolver.cookie_jar).await?;

    let muxer = Arc::new(FfmpegMuxer::new(config.tools.ffmpeg_path.clone()));
    if muxer.locate().is_err() {
        // jobs will keep failing fast with the same message until the
        // binary shows up at the configured path
        warn!(
            "FFmpeg not found at {} - downloads will be rejected",
            config.tools.ffmpeg_path.display()
        );
    }

    let resolver = Arc::new(YtDlpResolver::new(
        config.tools.ytdlp_path.clone(),
        Some(config.tools.ffmpeg_path.clone()),
    ));
    let auth = AuthContext {
        cookie_jar: Some(config.resolver.cookie_jar.clone()),
        extractor_args: config.resolver.extractor_args.clone(),
    };

    let orchestrator = Arc::new(JobOrchestrator::new(
        resolver,
        muxer,
        store.clone(),
        auth,
    ));

    let reaper = spawn_reaper(store, config.store.sweep_interval);

    let state = AppState {
        orchestrator,
        cookie_jar: config.resolver.cookie_jar.clone(),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Clipforge server running on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
    }
}
