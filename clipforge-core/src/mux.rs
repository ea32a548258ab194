//! FFmpeg mux adapter for combining downloaded streams.
//!
//! Wraps the external transcoding binary behind the [`StreamMuxer`] trait so
//! the job pipeline can run against either the real tool or a simulated one
//! in tests. The production implementation copies the video stream, re-encodes
//! audio to AAC, and optionally trims to a time range.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Errors from the mux step.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The configured transcoding binary could not be located. The message
    /// is the exact user-visible string the download endpoint returns.
    #[error("FFmpeg not found. Cannot proceed.")]
    ToolUnavailable,

    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg exited with code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    #[error("failed to stat output {path}: {source}")]
    OutputUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Time range for trimming, both bounds required.
///
/// Bounds are tool-native timestamp strings (`90`, `1:30`, `00:01:30.5`)
/// passed through unvalidated; a nonsensical range surfaces as the external
/// tool's own failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimRange {
    pub start: String,
    pub end: String,
}

impl TrimRange {
    /// Build a range under the both-or-neither policy: a missing or empty
    /// bound on either side means no trimming at all.
    pub fn from_bounds(start: Option<&str>, end: Option<&str>) -> Option<Self> {
        match (start, end) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => Some(Self {
                start: start.to_string(),
                end: end.to_string(),
            }),
            _ => None,
        }
    }
}

/// Result of a successful mux.
#[derive(Debug)]
pub struct MuxOutcome {
    /// Size of the output file in bytes
    pub output_size: u64,
    /// Wall-clock processing time in seconds
    pub processing_time: f64,
}

/// Abstraction over the external mux/trim step.
#[async_trait]
pub trait StreamMuxer: Send + Sync {
    /// Check that the transcoding binary can be located.
    ///
    /// # Errors
    /// - `MuxError::ToolUnavailable` - binary missing at the configured path
    fn locate(&self) -> Result<(), MuxError>;

    /// Combine `video` and `audio` into one container at `output`,
    /// restricted to `trim` when a range is given.
    ///
    /// On failure nothing durable is written; any partial output is
    /// untrusted and removed by the caller, not here.
    ///
    /// # Errors
    /// - `MuxError::ToolUnavailable` - binary missing
    /// - `MuxError::ProcessFailed` - non-zero exit from the external tool
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        trim: Option<&TrimRange>,
    ) -> Result<MuxOutcome, MuxError>;
}

/// Returns whether `binary` names an executable we can find: an explicit
/// path must exist as a file, a bare name must resolve through `PATH`.
fn binary_exists(binary: &Path) -> bool {
    if binary.components().count() > 1 {
        return binary.is_file();
    }
    match std::env::var_os("PATH") {
        Some(paths) => std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file()),
        None => false,
    }
}

/// Production muxer invoking the ffmpeg binary as a subprocess.
pub struct FfmpegMuxer {
    binary: PathBuf,
}

impl FfmpegMuxer {
    /// Create a muxer driving the binary at `binary` (a bare name resolves
    /// through `PATH`).
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The fixed argument sequence: copy video, re-encode audio to AAC, and
    /// trim only when both bounds are present.
    fn build_args(
        video: &Path,
        audio: &Path,
        output: &Path,
        trim: Option<&TrimRange>,
    ) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = vec![
            "-y".into(),
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-strict".into(),
            "experimental".into(),
        ];

        if let Some(range) = trim {
            args.push("-ss".into());
            args.push(range.start.clone().into());
            args.push("-to".into());
            args.push(range.end.clone().into());
        }

        args.push(output.into());
        args
    }
}

#[async_trait]
impl StreamMuxer for FfmpegMuxer {
    fn locate(&self) -> Result<(), MuxError> {
        if binary_exists(&self.binary) {
            Ok(())
        } else {
            warn!("FFmpeg not found at {}", self.binary.display());
            Err(MuxError::ToolUnavailable)
        }
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        trim: Option<&TrimRange>,
    ) -> Result<MuxOutcome, MuxError> {
        self.locate()?;

        let start_time = Instant::now();
        let args = Self::build_args(video, audio, output, trim);

        info!(
            "Muxing {} + {} -> {}",
            video.display(),
            audio.display(),
            output.display()
        );
        debug!("ffmpeg args: {args:?}");

        let result = tokio::process::Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(MuxError::Spawn)?;

        let stderr = String::from_utf8_lossy(&result.stderr);
        if !result.status.success() {
            let exit_code = result.status.code().unwrap_or(-1);
            warn!("ffmpeg failed with code {exit_code}: {stderr}");
            return Err(MuxError::ProcessFailed {
                exit_code,
                stderr: stderr.trim().to_string(),
            });
        }

        let output_size = tokio::fs::metadata(output)
            .await
            .map_err(|source| MuxError::OutputUnreadable {
                path: output.to_path_buf(),
                source,
            })?
            .len();

        let processing_time = start_time.elapsed().as_secs_f64();
        info!(
            "Muxed {} bytes to {} in {processing_time:.2}s",
            output_size,
            output.display()
        );

        Ok(MuxOutcome {
            output_size,
            processing_time,
        })
    }
}

/// Simulated muxer for tests.
///
/// Concatenates the two input files into the output so callers can assert a
/// non-empty result, and records the trim argument of every invocation.
pub struct SimulationMuxer {
    available: bool,
    force_failure: bool,
    recorded_trims: std::sync::Mutex<Vec<Option<TrimRange>>>,
}

impl SimulationMuxer {
    /// Create a muxer that succeeds.
    pub fn new() -> Self {
        Self {
            available: true,
            force_failure: false,
            recorded_trims: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Simulate a missing transcoding binary.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Simulate a non-zero exit from the tool.
    pub fn failing(mut self) -> Self {
        self.force_failure = true;
        self
    }

    /// Trim arguments seen so far, in invocation order.
    pub fn recorded_trims(&self) -> Vec<Option<TrimRange>> {
        self.recorded_trims.lock().unwrap().clone()
    }
}

impl Default for SimulationMuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamMuxer for SimulationMuxer {
    fn locate(&self) -> Result<(), MuxError> {
        if self.available {
            Ok(())
        } else {
            Err(MuxError::ToolUnavailable)
        }
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        trim: Option<&TrimRange>,
    ) -> Result<MuxOutcome, MuxError> {
        self.locate()?;
        self.recorded_trims.lock().unwrap().push(trim.cloned());

        if self.force_failure {
            return Err(MuxError::ProcessFailed {
                exit_code: 1,
                stderr: "simulated mux failure".to_string(),
            });
        }

        let video_bytes = tokio::fs::read(video).await.map_err(MuxError::Spawn)?;
        let audio_bytes = tokio::fs::read(audio).await.map_err(MuxError::Spawn)?;

        let mut merged = video_bytes;
        merged.extend_from_slice(&audio_bytes);
        let output_size = merged.len() as u64;
        tokio::fs::write(output, merged)
            .await
            .map_err(MuxError::Spawn)?;

        Ok(MuxOutcome {
            output_size,
            processing_time: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_trim_range_requires_both_bounds() {
        assert!(TrimRange::from_bounds(Some("10"), Some("20")).is_some());
        assert!(TrimRange::from_bounds(Some("10"), None).is_none());
        assert!(TrimRange::from_bounds(None, Some("20")).is_none());
        assert!(TrimRange::from_bounds(None, None).is_none());
        assert!(TrimRange::from_bounds(Some(""), Some("20")).is_none());
        assert!(TrimRange::from_bounds(Some("10"), Some("")).is_none());
    }

    #[test]
    fn test_build_args_without_trim() {
        let args = FfmpegMuxer::build_args(
            Path::new("v.mp4"),
            Path::new("a.m4a"),
            Path::new("out.mp4"),
            None,
        );

        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y", "-i", "v.mp4", "-i", "a.m4a", "-c:v", "copy", "-c:a", "aac", "-strict",
                "experimental", "out.mp4",
            ]
        );
    }

    #[test]
    fn test_build_args_with_trim() {
        let trim = TrimRange {
            start: "00:00:10".to_string(),
            end: "00:00:20".to_string(),
        };
        let args = FfmpegMuxer::build_args(
            Path::new("v.mp4"),
            Path::new("a.m4a"),
            Path::new("out.mp4"),
            Some(&trim),
        );

        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y", "-i", "v.mp4", "-i", "a.m4a", "-c:v", "copy", "-c:a", "aac", "-strict",
                "experimental", "-ss", "00:00:10", "-to", "00:00:20", "out.mp4",
            ]
        );
    }

    #[test]
    fn test_locate_missing_binary() {
        let muxer = FfmpegMuxer::new("/nonexistent/path/to/ffmpeg");
        assert!(matches!(muxer.locate(), Err(MuxError::ToolUnavailable)));
    }

    #[tokio::test]
    async fn test_simulation_muxer_merges_inputs() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("v.mp4");
        let audio = dir.path().join("a.m4a");
        let output = dir.path().join("out.mp4");
        tokio::fs::write(&video, b"video-bytes").await.unwrap();
        tokio::fs::write(&audio, b"audio-bytes").await.unwrap();

        let muxer = SimulationMuxer::new();
        let outcome = muxer.mux(&video, &audio, &output, None).await.unwrap();

        assert_eq!(outcome.output_size, 22);
        assert_eq!(
            tokio::fs::read(&output).await.unwrap(),
            b"video-bytesaudio-bytes"
        );
        assert_eq!(muxer.recorded_trims(), vec![None]);
    }

    #[tokio::test]
    async fn test_simulation_muxer_failure_writes_nothing() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("v.mp4");
        let audio = dir.path().join("a.m4a");
        let output = dir.path().join("out.mp4");
        tokio::fs::write(&video, b"v").await.unwrap();
        tokio::fs::write(&audio, b"a").await.unwrap();

        let muxer = SimulationMuxer::new().failing();
        let result = muxer.mux(&video, &audio, &output, None).await;

        assert!(matches!(result, Err(MuxError::ProcessFailed { .. })));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_simulation_muxer_unavailable() {
        let muxer = SimulationMuxer::new().unavailable();
        assert!(matches!(muxer.locate(), Err(MuxError::ToolUnavailable)));
    }
}
