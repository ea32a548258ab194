//! Job orchestrator: the download-and-assembly state machine.
//!
//! One job runs `ResolvingTool -> DownloadingVideo -> DownloadingAudio ->
//! Muxing -> CleaningUp -> Done`, strictly in that order, with a stage-tagged
//! failure reachable from any state. Temp files are removed on every exit
//! path, success or failure, so a finished job never leaves intermediates
//! behind and a failed job never leaves a servable output.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::mux::{MuxError, StreamMuxer, TrimRange};
use crate::resolver::{
    AuthContext, BEST_AUDIO_SELECTOR, FormatDescriptor, MediaResolver, ResolverError,
};
use crate::store::{ArtifactSet, ArtifactStore, StoreError};

/// Pipeline stages, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    ResolvingTool,
    DownloadingVideo,
    DownloadingAudio,
    Muxing,
    CleaningUp,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStage::ResolvingTool => "resolving-tool",
            JobStage::DownloadingVideo => "downloading-video",
            JobStage::DownloadingAudio => "downloading-audio",
            JobStage::Muxing => "muxing",
            JobStage::CleaningUp => "cleaning-up",
        };
        write!(f, "{name}")
    }
}

/// Errors a job can end with. Every variant is safe to show to the caller.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Missing or malformed required field, caught before any external call.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The required transcoding binary is missing. Exact user-visible string.
    #[error("FFmpeg not found. Cannot proceed.")]
    ToolUnavailable,

    #[error("format listing failed: {source}")]
    Listing {
        #[source]
        source: ResolverError,
    },

    #[error("video download failed: {source}")]
    VideoDownload {
        #[source]
        source: ResolverError,
    },

    #[error("audio download failed: {source}")]
    AudioDownload {
        #[source]
        source: ResolverError,
    },

    #[error("mux failed: {source}")]
    Mux {
        #[source]
        source: MuxError,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl JobError {
    /// The pipeline stage this failure belongs to, if it occurred inside a
    /// running job (request validation happens before the machine starts).
    pub fn stage(&self) -> Option<JobStage> {
        match self {
            JobError::InvalidRequest { .. } => None,
            JobError::ToolUnavailable | JobError::Listing { .. } => Some(JobStage::ResolvingTool),
            // store creation happens while entering the video download
            JobError::Store(_) | JobError::VideoDownload { .. } => {
                Some(JobStage::DownloadingVideo)
            }
            JobError::AudioDownload { .. } => Some(JobStage::DownloadingAudio),
            JobError::Mux { .. } => Some(JobStage::Muxing),
        }
    }

    /// Whether this failure was caused by the caller's input rather than an
    /// external tool or the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(self, JobError::InvalidRequest { .. })
    }
}

/// A single fetch-and-mux request.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Page URL handed to the resolver
    pub source_url: String,
    /// Stream variant selected from a prior listing
    pub format_id: String,
    /// Basename for the artifact set; must not contain path separators or
    /// traversal sequences
    pub output_name: String,
    /// Optional trim range (already reduced under both-or-neither)
    pub trim: Option<TrimRange>,
}

impl JobRequest {
    /// Validate the request and return the sanitized output name.
    fn validate(&self) -> Result<String, JobError> {
        if self.source_url.trim().is_empty() {
            return Err(JobError::InvalidRequest {
                reason: "source_url is required".to_string(),
            });
        }
        if Url::parse(&self.source_url).is_err() {
            return Err(JobError::InvalidRequest {
                reason: format!("source_url is not a valid URL: {}", self.source_url),
            });
        }
        if self.format_id.trim().is_empty() {
            return Err(JobError::InvalidRequest {
                reason: "format_id is required".to_string(),
            });
        }
        sanitize_output_name(&self.output_name)
    }
}

/// Reject names that could escape the store directory.
///
/// Rejecting beats rewriting here: a silently altered name would change the
/// path the client later expects to retrieve.
fn sanitize_output_name(name: &str) -> Result<String, JobError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(JobError::InvalidRequest {
            reason: "output_filename is required".to_string(),
        });
    }
    if name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(JobError::InvalidRequest {
            reason: format!("output_filename contains unsafe characters: {name}"),
        });
    }
    Ok(name.to_string())
}

/// Drives one job through the pipeline: resolver downloads, the mux step,
/// and intermediate file lifecycle.
///
/// Concurrent jobs share nothing mutable beyond the store directory itself;
/// isolation relies on per-job output names.
pub struct JobOrchestrator {
    resolver: Arc<dyn MediaResolver>,
    muxer: Arc<dyn StreamMuxer>,
    store: ArtifactStore,
    auth: AuthContext,
}

impl JobOrchestrator {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        muxer: Arc<dyn StreamMuxer>,
        store: ArtifactStore,
        auth: AuthContext,
    ) -> Self {
        Self {
            resolver,
            muxer,
            store,
            auth,
        }
    }

    /// The store this orchestrator writes artifacts into.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Enumerate selectable formats for `url`.
    ///
    /// The transcoding binary is checked first: the resolver depends on it
    /// for some metadata paths, and reporting a missing tool before network
    /// I/O gives the caller a stable error.
    ///
    /// # Errors
    /// - `JobError::InvalidRequest` - `url` is not a valid URL
    /// - `JobError::ToolUnavailable` - transcoding binary missing
    /// - `JobError::Listing` - the resolver failed
    pub async fn list_formats(&self, url: &str) -> Result<Vec<FormatDescriptor>, JobError> {
        if url.trim().is_empty() || Url::parse(url).is_err() {
            return Err(JobError::InvalidRequest {
                reason: format!("url is not a valid URL: {url}"),
            });
        }
        self.muxer.locate().map_err(|_| JobError::ToolUnavailable)?;
        self.resolver
            .list_formats(url)
            .await
            .map_err(|source| JobError::Listing { source })
    }

    /// Run one job to completion and return the final artifact path.
    ///
    /// On failure the error carries the stage it happened in, no temp file
    /// survives, and the returned path of a prior success is never
    /// invalidated.
    ///
    /// # Errors
    /// - `JobError::InvalidRequest` - bad input, nothing was attempted
    /// - `JobError::ToolUnavailable` - transcoding binary missing; no file
    ///   was written
    /// - `JobError::VideoDownload` / `JobError::AudioDownload` /
    ///   `JobError::Mux` - stage failures after cleanup ran
    pub async fn run_job(&self, request: &JobRequest) -> Result<PathBuf, JobError> {
        let output_name = request.validate()?;

        // ResolvingTool: fail before any I/O against the job's URL
        self.muxer.locate().map_err(|_| JobError::ToolUnavailable)?;

        self.store.ensure_exists().await?;
        let artifacts = self.store.artifact_set(&output_name);

        info!(
            "Job {output_name}: fetching {} (format {}, trim {:?})",
            request.source_url, request.format_id, request.trim
        );

        let result = self.execute(request, &artifacts).await;

        // CleaningUp: unconditional, so no stage can leak intermediates
        artifacts.remove_temps().await;

        match result {
            Ok(()) => {
                info!(
                    "Job {output_name} complete: {}",
                    artifacts.final_output.display()
                );
                Ok(artifacts.final_output)
            }
            Err(e) => {
                // a failed mux may have written a partial file; never serve it
                artifacts.remove_final().await;
                warn!(
                    "Job {output_name} failed in stage {}: {e}",
                    e.stage().map_or_else(|| "-".to_string(), |s| s.to_string())
                );
                Err(e)
            }
        }
    }

    /// Stages `DownloadingVideo -> DownloadingAudio -> Muxing`, in order.
    /// Downloads are sequential; both must complete before the mux starts.
    async fn execute(&self, request: &JobRequest, artifacts: &ArtifactSet) -> Result<(), JobError> {
        self.resolver
            .fetch_stream(
                &request.source_url,
                &request.format_id,
                &artifacts.video_tmp,
                &self.auth,
            )
            .await
            .map_err(|source| JobError::VideoDownload { source })?;

        self.resolver
            .fetch_stream(
                &request.source_url,
                BEST_AUDIO_SELECTOR,
                &artifacts.audio_tmp,
                &self.auth,
            )
            .await
            .map_err(|source| JobError::AudioDownload { source })?;

        self.muxer
            .mux(
                &artifacts.video_tmp,
                &artifacts.audio_tmp,
                &artifacts.final_output,
                request.trim.as_ref(),
            )
            .await
            .map_err(|source| JobError::Mux { source })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::mux::SimulationMuxer;
    use crate::resolver::SimulationResolver;

    fn request(output_name: &str) -> JobRequest {
        JobRequest {
            source_url: "https://example.com/v".to_string(),
            format_id: "18".to_string(),
            output_name: output_name.to_string(),
            trim: None,
        }
    }

    fn orchestrator(
        resolver: SimulationResolver,
        muxer: SimulationMuxer,
        root: &std::path::Path,
    ) -> (JobOrchestrator, Arc<SimulationResolver>, Arc<SimulationMuxer>) {
        let resolver = Arc::new(resolver);
        let muxer = Arc::new(muxer);
        let orchestrator = JobOrchestrator::new(
            resolver.clone(),
            muxer.clone(),
            ArtifactStore::new(root),
            AuthContext::default(),
        );
        (orchestrator, resolver, muxer)
    }

    #[test]
    fn test_sanitize_output_name() {
        assert!(sanitize_output_name("my_clip-01").is_ok());
        assert!(sanitize_output_name("  padded  ").is_ok());
        assert!(sanitize_output_name("").is_err());
        assert!(sanitize_output_name("   ").is_err());
        assert!(sanitize_output_name("a/b").is_err());
        assert!(sanitize_output_name("a\\b").is_err());
        assert!(sanitize_output_name("../escape").is_err());
        assert!(sanitize_output_name("nul\0name").is_err());
    }

    #[tokio::test]
    async fn test_successful_job_leaves_only_final_output() {
        let dir = tempdir().unwrap();
        let (orchestrator, _, _) =
            orchestrator(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

        let path = orchestrator.run_job(&request("clip")).await.unwrap();

        assert!(path.exists());
        assert!(tokio::fs::metadata(&path).await.unwrap().len() > 0);
        assert!(!dir.path().join("clip_video.mp4").exists());
        assert!(!dir.path().join("clip_audio.m4a").exists());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_any_fetch() {
        let dir = tempdir().unwrap();
        let (orchestrator, resolver, _) =
            orchestrator(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

        let mut bad = request("clip");
        bad.source_url = "not a url".to_string();
        let err = orchestrator.run_job(&bad).await.unwrap_err();

        assert!(matches!(err, JobError::InvalidRequest { .. }));
        assert!(err.is_user_error());
        assert_eq!(resolver.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_traversal_name_rejected_before_any_fetch() {
        let dir = tempdir().unwrap();
        let (orchestrator, resolver, _) =
            orchestrator(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

        let err = orchestrator.run_job(&request("../escape")).await.unwrap_err();

        assert!(matches!(err, JobError::InvalidRequest { .. }));
        assert_eq!(resolver.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_is_terminal_before_io() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");
        let (orchestrator, resolver, _) = orchestrator(
            SimulationResolver::new(),
            SimulationMuxer::new().unavailable(),
            &root,
        );

        let err = orchestrator.run_job(&request("clip")).await.unwrap_err();

        assert!(matches!(err, JobError::ToolUnavailable));
        assert_eq!(err.to_string(), "FFmpeg not found. Cannot proceed.");
        assert_eq!(err.stage(), Some(JobStage::ResolvingTool));
        assert_eq!(resolver.fetch_calls(), 0);
        // locate() precedes directory creation, so nothing was written
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_video_failure_leaves_no_files() {
        let dir = tempdir().unwrap();
        let (orchestrator, resolver, _) = orchestrator(
            SimulationResolver::new().failing_selector("18"),
            SimulationMuxer::new(),
            dir.path(),
        );

        let err = orchestrator.run_job(&request("clip")).await.unwrap_err();

        assert!(matches!(err, JobError::VideoDownload { .. }));
        assert_eq!(err.stage(), Some(JobStage::DownloadingVideo));
        assert_eq!(resolver.fetch_calls(), 1);
        assert!(!dir.path().join("clip_video.mp4").exists());
        assert!(!dir.path().join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_audio_failure_cleans_video_temp() {
        let dir = tempdir().unwrap();
        let (orchestrator, resolver, _) = orchestrator(
            SimulationResolver::new().failing_selector(BEST_AUDIO_SELECTOR),
            SimulationMuxer::new(),
            dir.path(),
        );

        let err = orchestrator.run_job(&request("clip")).await.unwrap_err();

        assert!(matches!(err, JobError::AudioDownload { .. }));
        assert_eq!(err.stage(), Some(JobStage::DownloadingAudio));
        assert_eq!(resolver.fetch_calls(), 2);
        assert!(!dir.path().join("clip_video.mp4").exists());
        assert!(!dir.path().join("clip_audio.m4a").exists());
        assert!(!dir.path().join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_mux_failure_cleans_everything() {
        let dir = tempdir().unwrap();
        let (orchestrator, _, _) = orchestrator(
            SimulationResolver::new(),
            SimulationMuxer::new().failing(),
            dir.path(),
        );

        let err = orchestrator.run_job(&request("clip")).await.unwrap_err();

        assert!(matches!(err, JobError::Mux { .. }));
        assert_eq!(err.stage(), Some(JobStage::Muxing));
        assert!(!dir.path().join("clip_video.mp4").exists());
        assert!(!dir.path().join("clip_audio.m4a").exists());
        assert!(!dir.path().join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_trim_passed_through_to_muxer() {
        let dir = tempdir().unwrap();
        let (orchestrator, _, muxer) =
            orchestrator(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

        let trimmed = JobRequest {
            trim: TrimRange::from_bounds(Some("10"), Some("20")),
            ..request("trimmed")
        };
        orchestrator.run_job(&trimmed).await.unwrap();

        let untrimmed = JobRequest {
            trim: TrimRange::from_bounds(Some("10"), None),
            ..request("untrimmed")
        };
        orchestrator.run_job(&untrimmed).await.unwrap();

        assert_eq!(
            muxer.recorded_trims(),
            vec![
                Some(TrimRange {
                    start: "10".to_string(),
                    end: "20".to_string()
                }),
                None,
            ]
        );
    }

    #[tokio::test]
    async fn test_list_formats_checks_tool_first() {
        let dir = tempdir().unwrap();
        let (orchestrator, _, _) = orchestrator(
            SimulationResolver::new(),
            SimulationMuxer::new().unavailable(),
            dir.path(),
        );

        let err = orchestrator
            .list_formats("https://example.com/v")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::ToolUnavailable));
    }

    #[tokio::test]
    async fn test_list_formats_idempotent() {
        let dir = tempdir().unwrap();
        let (orchestrator, _, _) =
            orchestrator(SimulationResolver::new(), SimulationMuxer::new(), dir.path());

        let first = orchestrator
            .list_formats("https://example.com/v")
            .await
            .unwrap();
        let second = orchestrator
            .list_formats("https://example.com/v")
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}
