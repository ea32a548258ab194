//! Clipforge Web - JSON API server
//!
//! Request façade over the job pipeline: parses client requests, invokes
//! the orchestrator, and streams the resulting artifact (or a structured
//! error) back to the client.

pub mod handlers;
pub mod server;
pub mod static_files;

// Re-export main types
pub use server::{AppState, build_router, run_server};
