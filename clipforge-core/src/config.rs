//! Centralized configuration for Clipforge.
//!
//! All tunable parameters live here and are constructed once at startup,
//! then passed by reference into the orchestrator and adapters. No component
//! reads the environment on its own.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Clipforge components.
///
/// Groups related settings into logical sections. Supports environment
/// variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct ClipforgeConfig {
    pub tools: ToolConfig,
    pub store: StoreConfig,
    pub resolver: ResolverConfig,
    pub server: ServerConfig,
}

/// Paths to the external binaries the pipeline drives.
///
/// Bare names are looked up on `PATH`; anything containing a separator is
/// treated as an explicit path.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Transcoding binary used for the mux/trim step
    pub ffmpeg_path: PathBuf,
    /// Media resolution binary used for format listing and stream downloads
    pub ytdlp_path: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ytdlp_path: PathBuf::from("yt-dlp"),
        }
    }
}

/// Artifact store directory and reaper settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Shared output directory, created at startup if absent
    pub directory: PathBuf,
    /// Interval between reaper sweeps of the store directory
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("media-store"),
            sweep_interval: Duration::from_secs(1800), // 30 minutes
        }
    }
}

/// Resolver authorization settings, passed through to the external tool.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Cookie-jar file handed to the resolver; seeded with a placeholder
    /// template at startup if absent
    pub cookie_jar: PathBuf,
    /// Extra resolver arguments appended verbatim (site-specific extractor
    /// parameters, opaque to the pipeline)
    pub extractor_args: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cookie_jar: PathBuf::from("cookies.txt"),
            extractor_args: Vec::new(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ClipforgeConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Recognized variables: `CLIPFORGE_FFMPEG_PATH`, `CLIPFORGE_YTDLP_PATH`,
    /// `CLIPFORGE_STORE_DIR`, `CLIPFORGE_SWEEP_INTERVAL` (seconds),
    /// `CLIPFORGE_COOKIE_JAR`, `CLIPFORGE_PORT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CLIPFORGE_FFMPEG_PATH") {
            config.tools.ffmpeg_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("CLIPFORGE_YTDLP_PATH") {
            config.tools.ytdlp_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("CLIPFORGE_STORE_DIR") {
            config.store.directory = PathBuf::from(dir);
        }

        if let Ok(interval) = std::env::var("CLIPFORGE_SWEEP_INTERVAL") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.store.sweep_interval = Duration::from_secs(seconds);
            }
        }

        if let Ok(path) = std::env::var("CLIPFORGE_COOKIE_JAR") {
            config.resolver.cookie_jar = PathBuf::from(path);
        }

        if let Ok(port) = std::env::var("CLIPFORGE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server.port = port;
            }
        }

        config
    }
}
