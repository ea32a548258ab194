//! Media resolver adapter for format listing and stream downloads.
//!
//! Wraps the external yt-dlp binary behind the [`MediaResolver`] trait. The
//! production implementation shells out for both operations; the simulation
//! implementation serves canned metadata and placeholder streams for tests.
//! No operation retries: one invocation, failure surfaced verbatim.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Selector for the best available audio-only stream, used for the audio
/// half of every job.
pub const BEST_AUDIO_SELECTOR: &str = "bestaudio";

/// Errors from the external resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    /// The tool reported an extraction or network failure.
    #[error("download error: {reason}")]
    Extraction { reason: String },

    /// The tool succeeded but its metadata output was unusable.
    #[error("metadata parse failed: {reason}")]
    Metadata { reason: String },
}

/// Authorization context passed through to the resolver, opaque to the
/// pipeline beyond being forwarded.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    /// Cookie-jar file in Netscape format, forwarded when the file exists
    pub cookie_jar: Option<PathBuf>,
    /// Extra arguments appended verbatim (site-specific extractor settings)
    pub extractor_args: Vec<String>,
}

/// A numeric field the resolver may omit: the number when reported, the
/// literal string `"unknown"` on the wire when not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reported<T> {
    Known(T),
    Unknown(String),
}

impl<T> Reported<T> {
    pub fn unknown() -> Self {
        Self::Unknown("unknown".to_string())
    }

    pub fn from_option(value: Option<T>) -> Self {
        value.map_or_else(Self::unknown, Self::Known)
    }
}

/// Whether a format carries video, audio, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Both,
}

/// One selectable quality/codec variant of a source media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub id: String,
    /// `"<height>p"` for entries reporting a height, `"Audio Only"` otherwise
    pub resolution: String,
    pub fps: Reported<serde_json::Number>,
    /// Size in bytes when the tool reports one
    pub filesize: Reported<u64>,
    pub ext: String,
    #[serde(rename = "type")]
    pub kind: StreamKind,
}

/// Subset of the resolver's info JSON we consume. Everything is optional:
/// the tool omits metadata freely, especially for older uploads.
#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    height: Option<i64>,
    fps: Option<serde_json::Number>,
    filesize: Option<u64>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
}

impl RawFormat {
    /// Entries without a format id are unselectable and dropped.
    fn into_descriptor(self) -> Option<FormatDescriptor> {
        let id = self.format_id?;
        let resolution = match self.height {
            Some(height) => format!("{height}p"),
            None => "Audio Only".to_string(),
        };
        // a codec field of "none" means the stream is absent; a missing
        // field does not
        let has_video = self.vcodec.as_deref() != Some("none");
        let has_audio = self.acodec.as_deref() != Some("none");
        let kind = match (has_video, has_audio) {
            (true, true) => StreamKind::Both,
            (true, false) => StreamKind::Video,
            _ => StreamKind::Audio,
        };

        Some(FormatDescriptor {
            id,
            resolution,
            fps: Reported::from_option(self.fps),
            filesize: Reported::from_option(self.filesize),
            ext: self.ext.unwrap_or_else(|| "unknown".to_string()),
            kind,
        })
    }
}

/// Parse the resolver's info JSON into format descriptors.
fn parse_info_json(bytes: &[u8]) -> Result<Vec<FormatDescriptor>, ResolverError> {
    let info: InfoJson = serde_json::from_slice(bytes).map_err(|e| ResolverError::Metadata {
        reason: e.to_string(),
    })?;
    Ok(info
        .formats
        .into_iter()
        .filter_map(RawFormat::into_descriptor)
        .collect())
}

/// Abstraction over the external media-resolution tool.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Enumerate the selectable formats for `url` without downloading.
    ///
    /// # Errors
    /// - `ResolverError::Extraction` - the tool reported a failure
    /// - `ResolverError::Metadata` - the tool's JSON output was unusable
    async fn list_formats(&self, url: &str) -> Result<Vec<FormatDescriptor>, ResolverError>;

    /// Download exactly one stream (`selector` is a format id or
    /// [`BEST_AUDIO_SELECTOR`]) to `dest`.
    ///
    /// # Errors
    /// - `ResolverError::Extraction` - the tool reported a failure
    async fn fetch_stream(
        &self,
        url: &str,
        selector: &str,
        dest: &Path,
        auth: &AuthContext,
    ) -> Result<(), ResolverError>;
}

/// Production resolver invoking the yt-dlp binary as a subprocess.
pub struct YtDlpResolver {
    binary: PathBuf,
    /// Passed as `--ffmpeg-location`; the tool needs it for some metadata
    /// paths and for merged downloads
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<PathBuf>, ffmpeg_location: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg_location,
        }
    }

    async fn run(&self, args: Vec<std::ffi::OsString>) -> Result<Vec<u8>, ResolverError> {
        debug!("yt-dlp args: {args:?}");

        let output = tokio::process::Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|source| ResolverError::Spawn {
                tool: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp failed: {stderr}");
            return Err(ResolverError::Extraction {
                reason: stderr.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    fn common_args(&self) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = vec!["--no-warnings".into()];
        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.into());
        }
        args
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn list_formats(&self, url: &str) -> Result<Vec<FormatDescriptor>, ResolverError> {
        let mut args = self.common_args();
        args.push("--dump-single-json".into());
        args.push("--no-download".into());
        args.push(url.into());

        info!("Listing formats for {url}");
        let stdout = self.run(args).await?;
        let formats = parse_info_json(&stdout)?;
        info!("Found {} format(s) for {url}", formats.len());
        Ok(formats)
    }

    async fn fetch_stream(
        &self,
        url: &str,
        selector: &str,
        dest: &Path,
        auth: &AuthContext,
    ) -> Result<(), ResolverError> {
        let mut args = self.common_args();
        args.push("--no-playlist".into());
        args.push("-f".into());
        args.push(selector.into());
        args.push("-o".into());
        args.push(dest.into());

        if let Some(jar) = &auth.cookie_jar {
            if jar.is_file() {
                args.push("--cookies".into());
                args.push(jar.into());
            }
        }
        for extra in &auth.extractor_args {
            args.push(extra.into());
        }

        args.push(url.into());

        info!("Fetching stream {selector} of {url} to {}", dest.display());
        self.run(args).await?;
        Ok(())
    }
}

/// Simulated resolver for tests: canned descriptors, placeholder stream
/// files, configurable failure injection per selector.
pub struct SimulationResolver {
    formats: Vec<FormatDescriptor>,
    fail_listing: bool,
    failing_selectors: HashSet<String>,
    fetch_calls: AtomicUsize,
}

impl SimulationResolver {
    /// A resolver advertising one 360p MP4 format with id `"18"`.
    pub fn new() -> Self {
        Self {
            formats: vec![FormatDescriptor {
                id: "18".to_string(),
                resolution: "360p".to_string(),
                fps: Reported::Known(serde_json::Number::from(30u32)),
                filesize: Reported::Known(1_048_576),
                ext: "mp4".to_string(),
                kind: StreamKind::Both,
            }],
            fail_listing: false,
            failing_selectors: HashSet::new(),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_formats(formats: Vec<FormatDescriptor>) -> Self {
        Self {
            formats,
            ..Self::new()
        }
    }

    /// Make `list_formats` fail.
    pub fn listing_fails(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Make `fetch_stream` fail for one selector.
    pub fn failing_selector(mut self, selector: &str) -> Self {
        self.failing_selectors.insert(selector.to_string());
        self
    }

    /// Number of `fetch_stream` invocations so far.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl Default for SimulationResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaResolver for SimulationResolver {
    async fn list_formats(&self, url: &str) -> Result<Vec<FormatDescriptor>, ResolverError> {
        if self.fail_listing {
            return Err(ResolverError::Extraction {
                reason: format!("simulated extraction failure for {url}"),
            });
        }
        Ok(self.formats.clone())
    }

    async fn fetch_stream(
        &self,
        url: &str,
        selector: &str,
        dest: &Path,
        _auth: &AuthContext,
    ) -> Result<(), ResolverError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_selectors.contains(selector) {
            return Err(ResolverError::Extraction {
                reason: format!("simulated download failure for selector {selector}"),
            });
        }

        tokio::fs::write(dest, format!("simulated {selector} stream of {url}\n"))
            .await
            .map_err(|source| ResolverError::Spawn {
                tool: "simulation".to_string(),
                source,
            })
    }
}

/// Seed the cookie jar with a placeholder template if the file is absent.
///
/// The placeholder is a valid empty Netscape jar, so the resolver accepts
/// it until a real export is uploaded.
pub async fn ensure_cookie_jar(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    info!("Seeding placeholder cookie jar at {}", path.display());
    tokio::fs::write(
        path,
        "# Netscape HTTP Cookie File\n\
         # Placeholder jar. Upload a real cookie export to authorize\n\
         # restricted content.\n",
    )
    .await
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_descriptor_derivation_matches_wire_shape() {
        let info = json!({
            "formats": [{
                "format_id": "18",
                "height": 360,
                "fps": 30,
                "filesize": 1_048_576,
                "ext": "mp4",
                "vcodec": "avc1",
                "acodec": "aac"
            }]
        });

        let formats = parse_info_json(info.to_string().as_bytes()).unwrap();
        assert_eq!(formats.len(), 1);

        let wire = serde_json::to_value(&formats[0]).unwrap();
        assert_eq!(
            wire,
            json!({
                "id": "18",
                "resolution": "360p",
                "fps": 30,
                "filesize": 1_048_576,
                "ext": "mp4",
                "type": "both"
            })
        );
    }

    #[test]
    fn test_audio_only_entry() {
        let raw = RawFormat {
            format_id: Some("140".to_string()),
            height: None,
            fps: None,
            filesize: None,
            ext: Some("m4a".to_string()),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
        };

        let descriptor = raw.into_descriptor().unwrap();
        assert_eq!(descriptor.resolution, "Audio Only");
        assert_eq!(descriptor.kind, StreamKind::Audio);
        assert_eq!(descriptor.fps, Reported::unknown());
        assert_eq!(descriptor.filesize, Reported::unknown());

        let wire = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(wire["fps"], json!("unknown"));
        assert_eq!(wire["filesize"], json!("unknown"));
    }

    #[test]
    fn test_video_only_entry() {
        let raw = RawFormat {
            format_id: Some("136".to_string()),
            height: Some(720),
            fps: Some(serde_json::Number::from(60u32)),
            filesize: Some(99),
            ext: Some("mp4".to_string()),
            vcodec: Some("avc1".to_string()),
            acodec: Some("none".to_string()),
        };

        let descriptor = raw.into_descriptor().unwrap();
        assert_eq!(descriptor.resolution, "720p");
        assert_eq!(descriptor.kind, StreamKind::Video);
    }

    #[test]
    fn test_entries_without_format_id_are_dropped() {
        let info = json!({
            "formats": [
                {"ext": "mp4"},
                {"format_id": "22", "height": 720, "ext": "mp4"}
            ]
        });

        let formats = parse_info_json(info.to_string().as_bytes()).unwrap();
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].id, "22");
    }

    #[test]
    fn test_unparseable_metadata_is_an_error() {
        let result = parse_info_json(b"ERROR: not json");
        assert!(matches!(result, Err(ResolverError::Metadata { .. })));
    }

    #[tokio::test]
    async fn test_simulation_resolver_listing_is_idempotent() {
        let resolver = SimulationResolver::new();
        let first = resolver.list_formats("https://example.com/v").await.unwrap();
        let second = resolver.list_formats("https://example.com/v").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_simulation_resolver_writes_placeholder_stream() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("clip_video.mp4");
        let resolver = SimulationResolver::new();

        resolver
            .fetch_stream(
                "https://example.com/v",
                "18",
                &dest,
                &AuthContext::default(),
            )
            .await
            .unwrap();

        assert!(dest.exists());
        assert_eq!(resolver.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_simulation_resolver_failing_selector() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("clip_audio.m4a");
        let resolver = SimulationResolver::new().failing_selector(BEST_AUDIO_SELECTOR);

        let result = resolver
            .fetch_stream(
                "https://example.com/v",
                BEST_AUDIO_SELECTOR,
                &dest,
                &AuthContext::default(),
            )
            .await;

        assert!(matches!(result, Err(ResolverError::Extraction { .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_ensure_cookie_jar_seeds_once() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("cookies.txt");

        ensure_cookie_jar(&jar).await.unwrap();
        let seeded = tokio::fs::read_to_string(&jar).await.unwrap();
        assert!(seeded.starts_with("# Netscape HTTP Cookie File"));

        tokio::fs::write(&jar, "# real cookies\n").await.unwrap();
        ensure_cookie_jar(&jar).await.unwrap();
        let kept = tokio::fs::read_to_string(&jar).await.unwrap();
        assert_eq!(kept, "# real cookies\n");
    }
}
