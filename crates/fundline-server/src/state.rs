//! Shared application state for the Fundline server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers and middleware via `Arc`.

use std::path::PathBuf;
use std::sync::Arc;

use fundline_storage::AnalyticsStore;

use crate::config::{Environment, ServerConfig};
use crate::middleware::{LoadShedder, RateLimiter, RATE_WINDOW};
use crate::webhook::LeadForwarder;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Sessions, events, and leads.
    pub store: Arc<dyn AnalyticsStore>,
    pub environment: Environment,
    /// Built frontend bundle served at `/`.
    pub static_dir: PathBuf,
    /// Per-IP limiter for `POST /api/*`.
    pub rate_limiter: RateLimiter,
    /// Concurrency ceiling for all requests.
    pub load_shedder: LoadShedder,
    pub trust_proxy: bool,
    /// Allowed CORS origins (empty: any in development, none in production).
    pub cors_origins: Vec<String>,
    /// Bearer token for the dashboard summary (endpoint disabled if `None`).
    pub admin_token: Option<String>,
    /// Lead forwarding target (None if not configured).
    pub lead_forwarder: Option<LeadForwarder>,
}

impl AppState {
    /// Build state from configuration and an opened store.
    #[must_use]
    pub fn new(config: &ServerConfig, store: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            store,
            environment: config.environment,
            static_dir: config.static_dir.clone(),
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute, RATE_WINDOW),
            load_shedder: LoadShedder::new(
                config.max_in_flight,
                config.max_queue,
                config.queue_timeout,
            ),
            trust_proxy: config.trust_proxy,
            cors_origins: config.cors_origins.clone(),
            admin_token: config.admin_token.clone(),
            lead_forwarder: config
                .lead_webhook_url
                .as_deref()
                .and_then(LeadForwarder::new),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("environment", &self.environment)
            .field("static_dir", &self.static_dir)
            .finish_non_exhaustive()
    }
}
