//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use clipforge_core::config::ClipforgeConfig;
use clipforge_core::job::{JobOrchestrator, JobRequest};
use clipforge_core::mux::{FfmpegMuxer, TrimRange};
use clipforge_core::resolver::{AuthContext, Reported, YtDlpResolver};
use clipforge_core::store::ArtifactStore;
use clipforge_core::{ClipforgeError, Result};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind to (overrides CLIPFORGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Artifact store directory (overrides CLIPFORGE_STORE_DIR)
        #[arg(long)]
        store_dir: Option<PathBuf>,
    },
    /// List the selectable formats for a URL
    Formats {
        /// Media page URL
        url: String,
    },
    /// Fetch and mux one clip without starting the server
    Fetch {
        /// Media page URL
        url: String,
        /// Format id from a prior listing
        #[arg(short, long)]
        format: String,
        /// Output name (no extension, no path separators)
        #[arg(short, long)]
        output: String,
        /// Trim start timestamp; needs --trim-end to take effect
        #[arg(long)]
        trim_start: Option<String>,
        /// Trim end timestamp; needs --trim-start to take effect
        #[arg(long)]
        trim_end: Option<String>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Serve { port, store_dir } => serve(port, store_dir).await,
        Commands::Formats { url } => list_formats(url).await,
        Commands::Fetch {
            url,
            format,
            output,
            trim_start,
            trim_end,
        } => fetch(url, format, output, trim_start, trim_end).await,
    }
}

/// Build a production orchestrator from environment configuration.
fn production_orchestrator(config: &ClipforgeConfig) -> JobOrchestrator {
    let resolver = Arc::new(YtDlpResolver::new(
        config.tools.ytdlp_path.clone(),
        Some(config.tools.ffmpeg_path.clone()),
    ));
    let muxer = Arc::new(FfmpegMuxer::new(config.tools.ffmpeg_path.clone()));
    let auth = AuthContext {
        cookie_jar: Some(config.resolver.cookie_jar.clone()),
        extractor_args: config.resolver.extractor_args.clone(),
    };
    JobOrchestrator::new(
        resolver,
        muxer,
        ArtifactStore::new(config.store.directory.clone()),
        auth,
    )
}

async fn serve(port: Option<u16>, store_dir: Option<PathBuf>) -> Result<()> {
    let mut config = ClipforgeConfig::from_env();
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(dir) = store_dir {
        config.store.directory = dir;
    }

    clipforge_web::run_server(config)
        .await
        .map_err(|e| ClipforgeError::Configuration {
            reason: e.to_string(),
        })
}

async fn list_formats(url: String) -> Result<()> {
    let config = ClipforgeConfig::from_env();
    let orchestrator = production_orchestrator(&config);

    let formats = orchestrator.list_formats(&url).await?;
    if formats.is_empty() {
        println!("No selectable formats found for {url}");
        return Ok(());
    }

    println!("{:<8} {:<12} {:<8} {:<12} {:<6} {:<6}", "ID", "RESOLUTION", "FPS", "SIZE", "EXT", "TYPE");
    println!("{:-<60}", "");
    for format in &formats {
        println!(
            "{:<8} {:<12} {:<8} {:<12} {:<6} {:<6}",
            format.id,
            format.resolution,
            reported(&format.fps),
            reported(&format.filesize),
            format.ext,
            kind_label(format.kind),
        );
    }

    Ok(())
}

async fn fetch(
    url: String,
    format: String,
    output: String,
    trim_start: Option<String>,
    trim_end: Option<String>,
) -> Result<()> {
    let config = ClipforgeConfig::from_env();
    let orchestrator = production_orchestrator(&config);

    let request = JobRequest {
        source_url: url,
        format_id: format,
        output_name: output,
        trim: TrimRange::from_bounds(trim_start.as_deref(), trim_end.as_deref()),
    };

    println!("Fetching {} (format {})...", request.source_url, request.format_id);
    let path = orchestrator.run_job(&request).await?;
    println!("Done: {}", path.display());

    Ok(())
}

fn reported<T: std::fmt::Display>(value: &Reported<T>) -> String {
    match value {
        Reported::Known(value) => value.to_string(),
        Reported::Unknown(label) => label.clone(),
    }
}

fn kind_label(kind: clipforge_core::resolver::StreamKind) -> &'static str {
    match kind {
        clipforge_core::resolver::StreamKind::Video => "video",
        clipforge_core::resolver::StreamKind::Audio => "audio",
        clipforge_core::resolver::StreamKind::Both => "both",
    }
}
