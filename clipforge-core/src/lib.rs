//! Clipforge Core - fetch-and-mux job pipeline
//!
//! This crate provides the building blocks for turning a media URL and a
//! format selection into a single muxed (optionally trimmed) file: external
//! tool adapters, the job orchestrator, the shared artifact store with its
//! background reaper, and configuration management.

pub mod config;
pub mod job;
pub mod logging;
pub mod mux;
pub mod resolver;
pub mod store;

// Re-export main types for convenient access
pub use config::ClipforgeConfig;
pub use job::{JobError, JobOrchestrator, JobRequest, JobStage};
pub use mux::{FfmpegMuxer, MuxError, SimulationMuxer, StreamMuxer, TrimRange};
pub use resolver::{
    AuthContext, FormatDescriptor, MediaResolver, ResolverError, SimulationResolver, StreamKind,
    YtDlpResolver,
};
pub use store::{ArtifactStore, ReaperHandle, StoreError, spawn_reaper};

/// Core errors that can bubble up from any Clipforge subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ClipforgeError {
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Mux error: {0}")]
    Mux(#[from] MuxError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClipforgeError {
    /// Returns a user-friendly message suitable for display, without
    /// internal detail for non-user failures.
    pub fn user_message(&self) -> String {
        match self {
            // job errors are constructed to be caller-safe
            ClipforgeError::Job(e) => e.to_string(),
            ClipforgeError::Resolver(ResolverError::Extraction { reason }) => {
                format!("Download error: {reason}")
            }
            ClipforgeError::Resolver(_) => "Media resolution failed".to_string(),
            ClipforgeError::Mux(e @ MuxError::ToolUnavailable) => e.to_string(),
            ClipforgeError::Mux(_) => "Merge step failed".to_string(),
            ClipforgeError::Store(_) | ClipforgeError::Io(_) => {
                "File system error occurred".to_string()
            }
            ClipforgeError::Configuration { reason } => {
                format!("Configuration error: {reason}")
            }
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ClipforgeError::Job(e) if e.is_user_error())
    }
}

pub type Result<T> = std::result::Result<T, ClipforgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = ClipforgeError::Io(std::io::Error::other("raw os detail"));
        assert_eq!(err.user_message(), "File system error occurred");
    }

    #[test]
    fn test_tool_unavailable_message_is_exact() {
        let err = ClipforgeError::Job(JobError::ToolUnavailable);
        assert_eq!(err.user_message(), "FFmpeg not found. Cannot proceed.");
    }

    #[test]
    fn test_is_user_error() {
        let invalid = ClipforgeError::Job(JobError::InvalidRequest {
            reason: "output_filename is required".to_string(),
        });
        assert!(invalid.is_user_error());

        let tool = ClipforgeError::Job(JobError::ToolUnavailable);
        assert!(!tool.is_user_error());
    }
}
