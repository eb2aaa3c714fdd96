//! Lead capture.
//!
//! The contact and funding-application forms post here. A lead is validated,
//! stored, and optionally forwarded; "submitted" is its only state.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use fundline_storage::NewLead;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub success: bool,
    pub id: i64,
}

/// Build the leads router (merged into `/api`).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/leads", post(submit_lead))
        .route("/contact", post(submit_lead))
}

/// `POST /api/leads`: store a lead submission.
async fn submit_lead(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewLead>, JsonRejection>,
) -> Result<(StatusCode, Json<LeadResponse>), AppError> {
    let Json(body) = body?;
    let lead = state.store.submit_lead(body).await?;

    tracing::info!(
        lead_id = lead.id,
        funding_amount = %lead.funding_amount,
        source_page = lead.source_page.as_deref().unwrap_or("-"),
        "lead submitted"
    );

    let id = lead.id;
    if let Some(forwarder) = &state.lead_forwarder {
        forwarder.forward(lead);
    }

    Ok((StatusCode::CREATED, Json(LeadResponse { success: true, id })))
}
