//! Analytics and lead records.
//!
//! Sessions are keyed by an opaque client-generated token and overwritten on
//! reuse. Events and leads are append-only and carry server-assigned ids and
//! timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const MAX_SESSION_ID_LEN: usize = 128;
const MAX_PATH_LEN: usize = 2048;
const MAX_ELEMENT_ID_LEN: usize = 256;
const MAX_NAME_LEN: usize = 200;
const MAX_EMAIL_LEN: usize = 254;
const MAX_MESSAGE_LEN: usize = 5000;
const MAX_SHORT_TEXT_LEN: usize = 200;

// ── Sessions ─────────────────────────────────────────────────────────

/// One visitor's browsing interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    pub entry_page: String,
    pub exit_page: Option<String>,
}

impl Session {
    /// Duration in seconds, if the session has been closed.
    #[must_use]
    pub fn duration_secs(&self) -> Option<i64> {
        self.end_ts.map(|end| (end - self.start_ts).num_seconds())
    }
}

/// Payload for opening (or re-opening) a session.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub session_id: String,
    pub entry_page: String,
}

impl NewSession {
    /// Validate and trim the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] naming the first offending field.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        Ok(Self {
            session_id: validate_session_id(&self.session_id)?,
            entry_page: validate_path("entry_page", &self.entry_page)?,
        })
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Kind of tracked interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Click,
    Navigation,
    Performance,
}

impl EventType {
    pub const ALL: [Self; 3] = [Self::Click, Self::Navigation, Self::Performance];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Navigation => "navigation",
            Self::Performance => "performance",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "click" => Ok(Self::Click),
            "navigation" => Ok(Self::Navigation),
            "performance" => Ok(Self::Performance),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// A single recorded interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub session_id: String,
    pub page_path: String,
    pub event_type: EventType,
    pub element_id: Option<String>,
    /// Metric value in milliseconds for `performance` events.
    pub value: Option<f64>,
    pub ts: DateTime<Utc>,
}

/// Payload for appending an event.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub session_id: String,
    pub page_path: String,
    pub event_type: EventType,
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl NewEvent {
    /// Validate and trim the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] naming the first offending field.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let element_id = optional_text("element_id", self.element_id, MAX_ELEMENT_ID_LEN)?;
        if let Some(v) = self.value {
            if !v.is_finite() || v < 0.0 {
                return Err(ValidationError::new(
                    "value",
                    "must be a non-negative finite number",
                ));
            }
        }
        Ok(Self {
            session_id: validate_session_id(&self.session_id)?,
            page_path: validate_path("page_path", &self.page_path)?,
            event_type: self.event_type,
            element_id,
            value: self.value,
        })
    }
}

// ── Leads ────────────────────────────────────────────────────────────

/// Requested funding amount bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundingRange {
    #[serde(rename = "under_50k")]
    Under50k,
    #[serde(rename = "50k_100k")]
    From50kTo100k,
    #[serde(rename = "100k_250k")]
    From100kTo250k,
    #[serde(rename = "250k_500k")]
    From250kTo500k,
    #[serde(rename = "500k_1m")]
    From500kTo1m,
    #[serde(rename = "over_1m")]
    Over1m,
}

impl FundingRange {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Under50k => "under_50k",
            Self::From50kTo100k => "50k_100k",
            Self::From100kTo250k => "100k_250k",
            Self::From250kTo500k => "250k_500k",
            Self::From500kTo1m => "500k_1m",
            Self::Over1m => "over_1m",
        }
    }
}

impl std::fmt::Display for FundingRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FundingRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "under_50k" => Ok(Self::Under50k),
            "50k_100k" => Ok(Self::From50kTo100k),
            "100k_250k" => Ok(Self::From100kTo250k),
            "250k_500k" => Ok(Self::From250kTo500k),
            "500k_1m" => Ok(Self::From500kTo1m),
            "over_1m" => Ok(Self::Over1m),
            other => Err(format!("unknown funding range: {other}")),
        }
    }
}

/// A submitted contact / funding-interest form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub funding_amount: FundingRange,
    pub message: Option<String>,
    pub source_page: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for a lead submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    pub funding_amount: FundingRange,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub source_page: Option<String>,
}

impl NewLead {
    /// Validate and trim the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] naming the first offending field.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("name", "is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::new(
                "name",
                format!("must be at most {MAX_NAME_LEN} characters"),
            ));
        }

        let source_page = match self.source_page.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(p) => Some(validate_path("source_page", p)?),
        };

        Ok(Self {
            name: name.to_owned(),
            email: validate_email(&self.email)?,
            phone: validate_phone(self.phone)?,
            company: optional_text("company", self.company, MAX_SHORT_TEXT_LEN)?,
            industry: optional_text("industry", self.industry, MAX_SHORT_TEXT_LEN)?,
            funding_amount: self.funding_amount,
            message: optional_text("message", self.message, MAX_MESSAGE_LEN)?,
            source_page,
        })
    }
}

// ── Summary ──────────────────────────────────────────────────────────

/// Event totals per [`EventType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub click: u64,
    pub navigation: u64,
    pub performance: u64,
}

impl EventCounts {
    pub(crate) fn add(&mut self, kind: EventType, n: u64) {
        match kind {
            EventType::Click => self.click += n,
            EventType::Navigation => self.navigation += n,
            EventType::Performance => self.performance += n,
        }
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.click + self.navigation + self.performance
    }
}

/// Number of events recorded against one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub page_path: String,
    pub events: u64,
}

/// Aggregates for the internal dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub sessions: u64,
    pub closed_sessions: u64,
    pub events: EventCounts,
    pub top_pages: Vec<PageCount>,
    pub leads: u64,
    /// Mean duration of closed sessions, in seconds.
    pub avg_session_secs: Option<f64>,
}

// ── Field validation ─────────────────────────────────────────────────

pub(crate) fn validate_session_id(raw: &str) -> Result<String, ValidationError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(ValidationError::new("session_id", "is required"));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(ValidationError::new(
            "session_id",
            format!("must be at most {MAX_SESSION_ID_LEN} characters"),
        ));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(ValidationError::new(
            "session_id",
            "may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(id.to_owned())
}

pub(crate) fn validate_path(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let path = raw.trim();
    if !path.starts_with('/') {
        return Err(ValidationError::new(field, "must start with '/'"));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at most {MAX_PATH_LEN} bytes"),
        ));
    }
    Ok(path.to_owned())
}

fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(ValidationError::new("email", "is required"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ValidationError::new(
            "email",
            format!("must be at most {MAX_EMAIL_LEN} characters"),
        ));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::new("email", "must contain '@'"));
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("email", "is not a valid address"));
    }
    Ok(email.to_owned())
}

fn validate_phone(raw: Option<String>) -> Result<Option<String>, ValidationError> {
    let Some(phone) = raw else { return Ok(None) };
    let phone = phone.trim();
    if phone.is_empty() {
        return Ok(None);
    }
    if !(7..=20).contains(&phone.len()) {
        return Err(ValidationError::new("phone", "must be 7-20 characters"));
    }
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.'))
    {
        return Err(ValidationError::new(
            "phone",
            "may only contain digits, spaces and + - ( ) .",
        ));
    }
    Ok(Some(phone.to_owned()))
}

fn optional_text(
    field: &'static str,
    raw: Option<String>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(text) = raw else { return Ok(None) };
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if text.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(Some(text.to_owned()))
}
