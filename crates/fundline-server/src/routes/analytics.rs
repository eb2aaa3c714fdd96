//! Analytics routes.
//!
//! Session lifecycle and page events posted by the frontend tracker, plus the
//! summary read by the internal dashboard. Each write is a single row; a
//! failed write is logged and answered with 500, with no retry.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use fundline_storage::{AnalyticsSummary, Event, NewEvent, NewSession, Session, StorageError};

use crate::error::AppError;
use crate::state::AppState;

/// Largest accepted event batch.
pub const MAX_BATCH: usize = 50;

const DEFAULT_TOP_PAGES: u32 = 10;
const MAX_TOP_PAGES: u32 = 100;

/// Request body for closing a session.
#[derive(Debug, Deserialize)]
pub struct SessionEndRequest {
    pub session_id: String,
    pub exit_page: String,
}

/// Request body for a batch of events.
#[derive(Debug, Deserialize)]
pub struct EventBatchRequest {
    pub events: Vec<NewEvent>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub session: Session,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub success: bool,
    pub event: Event,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub recorded: usize,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub top: Option<u32>,
}

/// Build the analytics router (nested under `/api/analytics`).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session-start", post(session_start))
        .route("/session-end", post(session_end))
        .route("/event", post(record_event))
        .route("/events", post(record_batch))
        .route("/summary", get(summary))
}

/// `POST /api/analytics/session-start`: open a session, overwriting any
/// previous row with the same id.
async fn session_start(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewSession>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let Json(body) = body?;
    let session = state.store.start_session(body).await?;
    tracing::debug!(session_id = %session.session_id, entry_page = %session.entry_page, "session started");
    Ok(Json(SessionResponse {
        success: true,
        session,
    }))
}

/// `POST /api/analytics/session-end`: record the exit page.
async fn session_end(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SessionEndRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let Json(body) = body?;
    let session = state
        .store
        .end_session(&body.session_id, &body.exit_page)
        .await?;
    Ok(Json(SessionResponse {
        success: true,
        session,
    }))
}

/// `POST /api/analytics/event`: append one event.
async fn record_event(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let Json(body) = body?;
    let event = state.store.record_event(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(EventResponse {
            success: true,
            event,
        }),
    ))
}

/// `POST /api/analytics/events`: append up to [`MAX_BATCH`] events.
///
/// The whole batch is validated before anything is written.
async fn record_batch(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EventBatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchResponse>), AppError> {
    let Json(body) = body?;
    if body.events.is_empty() {
        return Err(AppError::BadRequest("events must not be empty".to_owned()));
    }
    if body.events.len() > MAX_BATCH {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_BATCH} events per batch"
        )));
    }

    let events = body
        .events
        .into_iter()
        .map(NewEvent::normalized)
        .collect::<Result<Vec<_>, _>>()
        .map_err(StorageError::from)?;

    let mut recorded = 0;
    for event in events {
        state.store.record_event(event).await?;
        recorded += 1;
    }

    Ok((
        StatusCode::CREATED,
        Json(BatchResponse {
            success: true,
            recorded,
        }),
    ))
}

/// `GET /api/analytics/summary`: dashboard aggregates.
///
/// Requires `Authorization: Bearer <FUNDLINE_ADMIN_TOKEN>`. When no admin
/// token is configured the endpoint does not exist.
async fn summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<SummaryParams>,
) -> Result<Json<AnalyticsSummary>, AppError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(AppError::NotFound("no such API endpoint".to_owned()));
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_owned()))?;

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(AppError::Unauthorized("invalid token".to_owned()));
    }

    let top = params
        .top
        .unwrap_or(DEFAULT_TOP_PAGES)
        .clamp(1, MAX_TOP_PAGES);
    let summary = state.store.summary(top).await?;
    Ok(Json(summary))
}
