//! HTTP routes for the Fundline server.
//!
//! ```text
//! /api/health                     GET   liveness + database check
//! /api/analytics/session-start    POST  open (or overwrite) a session
//! /api/analytics/session-end      POST  close a session
//! /api/analytics/event            POST  append one event
//! /api/analytics/events           POST  append a batch of events
//! /api/analytics/summary          GET   dashboard aggregates (admin token)
//! /api/leads, /api/contact        POST  lead submission
//! /assets/*                       GET   hashed frontend assets
//! everything else                 GET   static file or SPA index.html
//! ```

pub mod analytics;
pub mod assets;
pub mod health;
pub mod leads;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware as axum_mw;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::{load_shed_middleware, rate_limit_middleware};
use crate::security;
use crate::state::AppState;

/// Maximum JSON body size for API requests (64 KiB).
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the complete application router with all middleware applied.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .nest("/analytics", analytics::router())
        .merge(leads::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_middleware,
        ))
        .fallback(api_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    let app = Router::new()
        .nest("/api", api)
        .nest_service("/assets", assets::assets_service(&state.static_dir))
        .fallback_service(assets::spa_service(&state.static_dir))
        .layer(axum_mw::from_fn(assets::cache_control))
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            load_shed_middleware,
        ));

    let app = match cors_layer(&state) {
        Some(cors) => app.layer(cors),
        None => app,
    };

    security::apply(app, state.environment)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS: configured origins, or any origin in development. Production with
/// no configured origins stays same-origin only.
fn cors_layer(state: &AppState) -> Option<CorsLayer> {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if state.cors_origins.is_empty() {
        return (!state.environment.is_production()).then(|| base.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = state
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(base.allow_origin(AllowOrigin::list(origins)))
}

async fn api_not_found() -> AppError {
    AppError::NotFound("no such API endpoint".to_owned())
}
