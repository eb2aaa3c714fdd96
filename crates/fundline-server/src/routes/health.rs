//! Health check.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

/// `GET /api/health`: 200 when the store answers, 503 `unavailable` otherwise.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(error = %e, "health check: store unreachable");
        return Err(AppError::Unavailable("database unreachable".to_owned()));
    }

    Ok(Json(HealthResponse {
        status: "ok",
        environment: state.environment.as_str(),
        version: env!("CARGO_PKG_VERSION"),
        database: "ok",
    }))
}
