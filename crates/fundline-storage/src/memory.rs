//! In-memory analytics store.
//!
//! Holds everything behind a single `RwLock`. Nothing is persisted; use it
//! for tests and for a dev server started with `DATABASE_URL=memory`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{validate_path, validate_session_id};
use crate::{
    AnalyticsStore, AnalyticsSummary, Event, EventCounts, Lead, NewEvent, NewLead, NewSession,
    PageCount, Session, StorageError,
};

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    events: Vec<Event>,
    leads: Vec<Lead>,
}

/// An in-memory [`AnalyticsStore`].
///
/// Cloning shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(items: &[T], limit: u32) -> Vec<T>
where
    T: Clone,
{
    items
        .iter()
        .rev()
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

#[async_trait::async_trait]
impl AnalyticsStore for MemoryStore {
    async fn start_session(&self, session: NewSession) -> Result<Session, StorageError> {
        let session = session.normalized()?;
        let row = Session {
            session_id: session.session_id,
            start_ts: Utc::now(),
            end_ts: None,
            entry_page: session.entry_page,
            exit_page: None,
        };
        let mut inner = self.inner.write().await;
        inner.sessions.insert(row.session_id.clone(), row.clone());
        Ok(row)
    }

    async fn end_session(
        &self,
        session_id: &str,
        exit_page: &str,
    ) -> Result<Session, StorageError> {
        let session_id = validate_session_id(session_id)?;
        let exit_page = validate_path("exit_page", exit_page)?;

        let mut inner = self.inner.write().await;
        let row = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "session",
                id: session_id.clone(),
            })?;
        row.end_ts = Some(Utc::now().max(row.start_ts));
        row.exit_page = Some(exit_page);
        Ok(row.clone())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(session_id).cloned())
    }

    async fn list_sessions(&self, limit: u32) -> Result<Vec<Session>, StorageError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            b.start_ts
                .cmp(&a.start_ts)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(sessions)
    }

    async fn record_event(&self, event: NewEvent) -> Result<Event, StorageError> {
        let event = event.normalized()?;
        let mut inner = self.inner.write().await;
        let id = i64::try_from(inner.events.len())
            .map_err(|e| StorageError::query("record_event", e))?
            + 1;
        let row = Event {
            id,
            session_id: event.session_id,
            page_path: event.page_path,
            event_type: event.event_type,
            element_id: event.element_id,
            value: event.value,
            ts: Utc::now(),
        };
        inner.events.push(row.clone());
        Ok(row)
    }

    async fn list_events(&self, session_id: &str) -> Result<Vec<Event>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn submit_lead(&self, lead: NewLead) -> Result<Lead, StorageError> {
        let lead = lead.normalized()?;
        let mut inner = self.inner.write().await;
        let id = i64::try_from(inner.leads.len())
            .map_err(|e| StorageError::query("submit_lead", e))?
            + 1;
        let row = Lead {
            id,
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            company: lead.company,
            industry: lead.industry,
            funding_amount: lead.funding_amount,
            message: lead.message,
            source_page: lead.source_page,
            created_at: Utc::now(),
        };
        inner.leads.push(row.clone());
        Ok(row)
    }

    async fn list_leads(&self, limit: u32) -> Result<Vec<Lead>, StorageError> {
        let inner = self.inner.read().await;
        Ok(newest_first(&inner.leads, limit))
    }

    #[allow(clippy::cast_precision_loss)]
    async fn summary(&self, top_pages: u32) -> Result<AnalyticsSummary, StorageError> {
        let inner = self.inner.read().await;

        let mut events = EventCounts::default();
        let mut per_page: BTreeMap<&str, u64> = BTreeMap::new();
        for e in &inner.events {
            events.add(e.event_type, 1);
            *per_page.entry(e.page_path.as_str()).or_default() += 1;
        }

        let mut pages: Vec<PageCount> = per_page
            .into_iter()
            .map(|(page_path, events)| PageCount {
                page_path: page_path.to_owned(),
                events,
            })
            .collect();
        // Stable sort keeps the BTreeMap's path order among equal counts.
        pages.sort_by(|a, b| b.events.cmp(&a.events));
        pages.truncate(usize::try_from(top_pages).unwrap_or(usize::MAX));

        let durations: Vec<i64> = inner
            .sessions
            .values()
            .filter_map(Session::duration_secs)
            .collect();
        let avg_session_secs = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
        };

        Ok(AnalyticsSummary {
            sessions: inner.sessions.len() as u64,
            closed_sessions: durations.len() as u64,
            events,
            top_pages: pages,
            leads: inner.leads.len() as u64,
            avg_session_secs,
        })
    }
}
