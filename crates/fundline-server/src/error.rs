//! HTTP error types for the Fundline server.
//!
//! Every error produces a JSON body with a machine-readable `error` field and
//! a human-readable `message`. Internal failures are logged and reported to
//! the client with a generic message.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use fundline_storage::StorageError;

/// Application-level error returned from HTTP handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Client sent invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request body exceeded the configured limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Client exceeded its request budget for the current window.
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    TooManyRequests { retry_after: Duration },

    /// Server is at capacity and shed the request.
    #[error("server overloaded")]
    Overloaded { retry_after: Duration },

    /// A dependency (database) is not reachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal error (database, I/O, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn retry_after_header(retry_after: Duration) -> HeaderValue {
    // Round up so clients never retry before the window has reset.
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    HeaderValue::from(secs.max(1))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, error_type, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            Self::TooManyRequests { retry_after: wait } => {
                retry_after = Some(wait);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    "too many requests, please try again later".to_owned(),
                )
            }
            Self::Overloaded { retry_after: wait } => {
                retry_after = Some(wait);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "overloaded",
                    "server is busy, please try again shortly".to_owned(),
                )
            }
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(wait) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, retry_after_header(wait));
        }
        response
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(v) => Self::BadRequest(v.to_string()),
            StorageError::NotFound { .. } => Self::NotFound(err.to_string()),
            StorageError::Open { .. } | StorageError::Query { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}
