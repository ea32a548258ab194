//! Integration tests for Clipforge
//!
//! These tests verify the interaction between the orchestrator, the
//! external-tool adapters, the artifact store, and the HTTP façade, using
//! the simulation adapters in place of the real binaries.

#[path = "integration/job_pipeline.rs"]
mod job_pipeline;

#[path = "integration/artifact_reaper.rs"]
mod artifact_reaper;

#[path = "integration/http_api.rs"]
mod http_api;
