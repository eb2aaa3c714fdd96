//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Validation failures name the offending field so the
//! HTTP layer can hand them straight back to the client.

/// A payload field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    /// Name of the field as it appears in the JSON payload.
    pub field: &'static str,
    /// Human-readable description of the problem.
    pub reason: String,
}

impl ValidationError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open the database or run the schema migration.
    #[error("failed to open store at '{url}': {reason}")]
    Open { url: String, reason: String },

    /// A query against the backend failed.
    #[error("query '{operation}' failed: {reason}")]
    Query {
        operation: &'static str,
        reason: String,
    },

    /// The referenced record does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The payload was rejected before reaching the backend.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StorageError {
    pub(crate) fn query(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Query {
            operation,
            reason: err.to_string(),
        }
    }
}
