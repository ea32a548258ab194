//! HTTP request handlers organized by functionality

pub mod api;
pub mod download;

// Re-export handler functions
pub use api::{FormatsRequest, FormatsResponse, health_check, list_formats, upload_cookies};
pub use download::{DownloadRequest, download};
