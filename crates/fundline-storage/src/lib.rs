//! Storage layer for Fundline.
//!
//! This crate defines the [`AnalyticsStore`] trait: sessions, page events,
//! and lead submissions for the marketing site. It knows nothing about HTTP;
//! the server crate validates nothing itself and relies on the store to
//! reject malformed payloads with a [`ValidationError`].
//!
//! Two implementations are provided:
//!
//! - [`SqliteStore`]: production backend, a local SQLite file via `sqlx`
//! - [`MemoryStore`]: in-memory, for tests and throwaway dev servers

mod error;
mod memory;
pub mod models;
mod sqlite;

pub use error::{StorageError, ValidationError};
pub use memory::MemoryStore;
pub use models::{
    AnalyticsSummary, Event, EventCounts, EventType, FundingRange, Lead, NewEvent, NewLead,
    NewSession, PageCount, Session,
};
pub use sqlite::SqliteStore;

/// Persistent store for analytics sessions, events, and leads.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
/// Timestamps and ids are always assigned by the store, never by the caller.
#[async_trait::async_trait]
pub trait AnalyticsStore: Send + Sync + 'static {
    /// Open a session, overwriting any existing row with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] for a malformed payload, or
    /// [`StorageError::Query`] if the backend fails.
    async fn start_session(&self, session: NewSession) -> Result<Session, StorageError>;

    /// Close a session, recording the exit page. The last call wins.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the session was never started.
    async fn end_session(
        &self,
        session_id: &str,
        exit_page: &str,
    ) -> Result<Session, StorageError>;

    /// Fetch a single session.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the backend fails.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StorageError>;

    /// Most recently started sessions first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the backend fails.
    async fn list_sessions(&self, limit: u32) -> Result<Vec<Session>, StorageError>;

    /// Append an event. There is no update or delete path for events.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] for a malformed payload, or
    /// [`StorageError::Query`] if the backend fails.
    async fn record_event(&self, event: NewEvent) -> Result<Event, StorageError>;

    /// Events for one session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the backend fails.
    async fn list_events(&self, session_id: &str) -> Result<Vec<Event>, StorageError>;

    /// Store a lead submission.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] for a malformed payload, or
    /// [`StorageError::Query`] if the backend fails.
    async fn submit_lead(&self, lead: NewLead) -> Result<Lead, StorageError>;

    /// Most recent leads first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the backend fails.
    async fn list_leads(&self, limit: u32) -> Result<Vec<Lead>, StorageError>;

    /// Dashboard aggregates, with at most `top_pages` entries in the page list.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the backend fails.
    async fn summary(&self, top_pages: u32) -> Result<AnalyticsSummary, StorageError>;

    /// Cheap liveness check used by the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the backend is unreachable.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
