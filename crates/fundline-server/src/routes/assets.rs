//! Static frontend serving.
//!
//! `/assets/*` maps onto `<static_dir>/assets` and 404s on a miss, so a
//! stale hashed filename never gets HTML back. Every other path is looked up
//! under `<static_dir>` and falls back to `index.html` for client-side
//! routing. Content types come from the file extension.

use std::path::Path;

use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::services::{ServeDir, ServeFile};

const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Service for hashed build assets.
pub fn assets_service(static_dir: &Path) -> ServeDir {
    ServeDir::new(static_dir.join("assets")).precompressed_gzip()
}

/// Service for everything outside `/api` and `/assets`.
pub fn spa_service(static_dir: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")))
}

/// Set `Cache-Control` unless the handler already did: API responses are
/// never cached, successful asset responses are immutable, and HTML is
/// revalidated on every load.
pub async fn cache_control(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    let mut response = next.run(req).await;

    if response.headers().contains_key(header::CACHE_CONTROL) {
        return response;
    }

    let value = if path.starts_with("/api/") || path == "/api" {
        "no-store"
    } else if path.starts_with("/assets/") && response.status().is_success() {
        IMMUTABLE
    } else {
        "no-cache"
    };

    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
    response
}
