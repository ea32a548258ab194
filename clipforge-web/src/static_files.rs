//! Embedded UI page.
//!
//! The page is compiled into the binary so the server has no runtime asset
//! directory to locate.

use axum::response::Html;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Serve the single-page UI.
pub async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}
