//! SQLite analytics store.
//!
//! Three tables: `sessions` (keyed by the client token, upserted),
//! `events` and `leads` (append-only, autoincrement ids). The schema is
//! created on connect and every statement is `IF NOT EXISTS`, so reopening an
//! existing database is a no-op.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::models::{validate_path, validate_session_id};
use crate::{
    AnalyticsStore, AnalyticsSummary, Event, EventCounts, EventType, FundingRange, Lead,
    NewEvent, NewLead, NewSession, PageCount, Session, StorageError,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sessions (\
        session_id TEXT PRIMARY KEY, \
        start_ts   TEXT NOT NULL, \
        end_ts     TEXT, \
        entry_page TEXT NOT NULL, \
        exit_page  TEXT\
    )",
    "CREATE TABLE IF NOT EXISTS events (\
        id         INTEGER PRIMARY KEY AUTOINCREMENT, \
        session_id TEXT NOT NULL, \
        page_path  TEXT NOT NULL, \
        event_type TEXT NOT NULL CHECK (event_type IN ('click', 'navigation', 'performance')), \
        element_id TEXT, \
        value      REAL, \
        ts         TEXT NOT NULL\
    )",
    "CREATE INDEX IF NOT EXISTS idx_events_session ON events (session_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_page ON events (page_path)",
    "CREATE TABLE IF NOT EXISTS leads (\
        id             INTEGER PRIMARY KEY AUTOINCREMENT, \
        name           TEXT NOT NULL, \
        email          TEXT NOT NULL, \
        phone          TEXT, \
        company        TEXT, \
        industry       TEXT, \
        funding_amount TEXT NOT NULL, \
        message        TEXT, \
        source_page    TEXT, \
        created_at     TEXT NOT NULL\
    )",
];

/// An [`AnalyticsStore`] backed by a local SQLite database.
///
/// Thread-safe via `SqlitePool`. In-memory URLs (`sqlite::memory:`) are
/// pinned to a single long-lived connection so every query sees the same
/// database.
///
/// # Examples
///
/// ```no_run
/// # use fundline_storage::SqliteStore;
/// # #[tokio::main]
/// # async fn main() {
/// let store = SqliteStore::connect("sqlite://analytics.db").await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("pool", &"[SqlitePool]")
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url` and apply
    /// the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the URL is malformed, the file cannot
    /// be opened, or the migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let open_err = |reason: String| StorageError::Open {
            url: database_url.to_owned(),
            reason,
        };

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| open_err(e.to_string()))?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| open_err(e.to_string()))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| open_err(format!("migration failed: {e}")))?;
        }

        tracing::debug!(in_memory, "sqlite analytics store ready");
        Ok(Self { pool })
    }

    /// Close the pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ── Row mapping ──────────────────────────────────────────────────────

fn session_from_row(row: &SqliteRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        session_id: row.try_get("session_id")?,
        start_ts: row.try_get("start_ts")?,
        end_ts: row.try_get("end_ts")?,
        entry_page: row.try_get("entry_page")?,
        exit_page: row.try_get("exit_page")?,
    })
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_owned(),
        source: e.into(),
    })
}

fn event_from_row(row: &SqliteRow) -> Result<Event, sqlx::Error> {
    Ok(Event {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        page_path: row.try_get("page_path")?,
        event_type: parse_column::<EventType>(row, "event_type")?,
        element_id: row.try_get("element_id")?,
        value: row.try_get("value")?,
        ts: row.try_get("ts")?,
    })
}

fn lead_from_row(row: &SqliteRow) -> Result<Lead, sqlx::Error> {
    Ok(Lead {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        company: row.try_get("company")?,
        industry: row.try_get("industry")?,
        funding_amount: parse_column::<FundingRange>(row, "funding_amount")?,
        message: row.try_get("message")?,
        source_page: row.try_get("source_page")?,
        created_at: row.try_get("created_at")?,
    })
}

fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[async_trait::async_trait]
impl AnalyticsStore for SqliteStore {
    async fn start_session(&self, session: NewSession) -> Result<Session, StorageError> {
        let session = session.normalized()?;
        let now = Utc::now();

        sqlx::query(
            r"INSERT INTO sessions (session_id, start_ts, end_ts, entry_page, exit_page)
              VALUES (?1, ?2, NULL, ?3, NULL)
              ON CONFLICT (session_id) DO UPDATE SET
                start_ts = excluded.start_ts,
                end_ts = NULL,
                entry_page = excluded.entry_page,
                exit_page = NULL",
        )
        .bind(&session.session_id)
        .bind(now)
        .bind(&session.entry_page)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::query("start_session", e))?;

        Ok(Session {
            session_id: session.session_id,
            start_ts: now,
            end_ts: None,
            entry_page: session.entry_page,
            exit_page: None,
        })
    }

    async fn end_session(
        &self,
        session_id: &str,
        exit_page: &str,
    ) -> Result<Session, StorageError> {
        let session_id = validate_session_id(session_id)?;
        let exit_page = validate_path("exit_page", exit_page)?;

        // Single statement so a concurrent writer cannot invalidate a read
        // snapshot between lookup and update. Timestamps are RFC 3339 UTC
        // text, which compares in time order.
        let row = sqlx::query(
            r"UPDATE sessions
              SET end_ts = CASE WHEN start_ts > ?1 THEN start_ts ELSE ?1 END,
                  exit_page = ?2
              WHERE session_id = ?3
              RETURNING session_id, start_ts, end_ts, entry_page, exit_page",
        )
        .bind(Utc::now())
        .bind(&exit_page)
        .bind(&session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::query("end_session", e))?
        .ok_or_else(|| StorageError::NotFound {
            entity: "session",
            id: session_id.clone(),
        })?;

        session_from_row(&row).map_err(|e| StorageError::query("end_session", e))
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StorageError> {
        sqlx::query("SELECT * FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::query("get_session", e))?
            .map(|row| session_from_row(&row))
            .transpose()
            .map_err(|e| StorageError::query("get_session", e))
    }

    async fn list_sessions(&self, limit: u32) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY start_ts DESC, rowid DESC LIMIT ?1")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::query("list_sessions", e))?;

        rows.iter()
            .map(session_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| StorageError::query("list_sessions", e))
    }

    async fn record_event(&self, event: NewEvent) -> Result<Event, StorageError> {
        let event = event.normalized()?;
        let ts = Utc::now();

        let result = sqlx::query(
            r"INSERT INTO events (session_id, page_path, event_type, element_id, value, ts)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&event.session_id)
        .bind(&event.page_path)
        .bind(event.event_type.as_str())
        .bind(event.element_id.as_deref())
        .bind(event.value)
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::query("record_event", e))?;

        Ok(Event {
            id: result.last_insert_rowid(),
            session_id: event.session_id,
            page_path: event.page_path,
            event_type: event.event_type,
            element_id: event.element_id,
            value: event.value,
            ts,
        })
    }

    async fn list_events(&self, session_id: &str) -> Result<Vec<Event>, StorageError> {
        let rows = sqlx::query("SELECT * FROM events WHERE session_id = ?1 ORDER BY id")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::query("list_events", e))?;

        rows.iter()
            .map(event_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| StorageError::query("list_events", e))
    }

    async fn submit_lead(&self, lead: NewLead) -> Result<Lead, StorageError> {
        let lead = lead.normalized()?;
        let created_at = Utc::now();

        let result = sqlx::query(
            r"INSERT INTO leads
                (name, email, phone, company, industry, funding_amount, message, source_page, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(lead.phone.as_deref())
        .bind(lead.company.as_deref())
        .bind(lead.industry.as_deref())
        .bind(lead.funding_amount.as_str())
        .bind(lead.message.as_deref())
        .bind(lead.source_page.as_deref())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::query("submit_lead", e))?;

        Ok(Lead {
            id: result.last_insert_rowid(),
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            company: lead.company,
            industry: lead.industry,
            funding_amount: lead.funding_amount,
            message: lead.message,
            source_page: lead.source_page,
            created_at,
        })
    }

    async fn list_leads(&self, limit: u32) -> Result<Vec<Lead>, StorageError> {
        let rows = sqlx::query("SELECT * FROM leads ORDER BY id DESC LIMIT ?1")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::query("list_leads", e))?;

        rows.iter()
            .map(lead_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| StorageError::query("list_leads", e))
    }

    #[allow(clippy::cast_precision_loss)]
    async fn summary(&self, top_pages: u32) -> Result<AnalyticsSummary, StorageError> {
        let q = |e: sqlx::Error| StorageError::query("summary", e);

        let (sessions, closed_sessions): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(end_ts) FROM sessions")
                .fetch_one(&self.pool)
                .await
                .map_err(q)?;

        let mut events = EventCounts::default();
        let by_type: Vec<(String, i64)> =
            sqlx::query_as("SELECT event_type, COUNT(*) FROM events GROUP BY event_type")
                .fetch_all(&self.pool)
                .await
                .map_err(q)?;
        for (kind, n) in by_type {
            match kind.parse::<EventType>() {
                Ok(kind) => events.add(kind, count(n)),
                Err(e) => tracing::warn!(error = %e, "skipping unknown event type in summary"),
            }
        }

        let pages: Vec<(String, i64)> = sqlx::query_as(
            r"SELECT page_path, COUNT(*) AS n FROM events
              GROUP BY page_path
              ORDER BY n DESC, page_path ASC
              LIMIT ?1",
        )
        .bind(i64::from(top_pages))
        .fetch_all(&self.pool)
        .await
        .map_err(q)?;

        let (leads,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await
            .map_err(q)?;

        let spans: Vec<(DateTime<Utc>, DateTime<Utc>)> =
            sqlx::query_as("SELECT start_ts, end_ts FROM sessions WHERE end_ts IS NOT NULL")
                .fetch_all(&self.pool)
                .await
                .map_err(q)?;
        let avg_session_secs = if spans.is_empty() {
            None
        } else {
            let total: i64 = spans
                .iter()
                .map(|(start, end)| (*end - *start).num_seconds())
                .sum();
            Some(total as f64 / spans.len() as f64)
        };

        Ok(AnalyticsSummary {
            sessions: count(sessions),
            closed_sessions: count(closed_sessions),
            events,
            top_pages: pages
                .into_iter()
                .map(|(page_path, n)| PageCount {
                    page_path,
                    events: count(n),
                })
                .collect(),
            leads: count(leads),
            avg_session_secs,
        })
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::query("ping", e))?;
        Ok(())
    }
}
