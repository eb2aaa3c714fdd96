//! Server configuration for Fundline.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Fundline-specific settings use the `FUNDLINE_*` prefix; the platform
//! variables (`PORT`, `DATABASE_URL`, `NODE_ENV`, `SENTRY_DSN`) keep their
//! conventional names so existing deployments work unchanged.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default port when neither `FUNDLINE_BIND_ADDR` nor `PORT` is set.
pub const DEFAULT_PORT: u16 = 5000;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Configuration that cannot be served.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `DATABASE_URL` names a database other than SQLite.
    #[error(
        "DATABASE_URL uses unsupported scheme '{scheme}'; use a sqlite: URL, a file path, or 'memory'"
    )]
    UnsupportedDatabase { scheme: String },
}

/// Supported analytics store backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// SQLite database at the given `sqlx` URL.
    Sqlite { url: String },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    /// Analytics and lead store.
    pub store: StoreBackend,
    /// Directory holding the built frontend (`index.html` + `assets/`).
    pub static_dir: PathBuf,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// POST requests allowed per client IP per minute.
    pub rate_limit_per_minute: u32,
    /// Requests served concurrently before new ones start queueing.
    pub max_in_flight: usize,
    /// Requests allowed to wait for a slot before the server sheds load.
    pub max_queue: usize,
    /// Longest a queued request waits for a slot.
    pub queue_timeout: Duration,
    /// Take the client IP from `X-Forwarded-For`.
    pub trust_proxy: bool,
    /// Allowed CORS origins. Empty means same-origin only in production and
    /// any origin in development.
    pub cors_origins: Vec<String>,
    /// Bearer token guarding the dashboard summary endpoint.
    pub admin_token: Option<String>,
    /// URL each stored lead is forwarded to.
    pub lead_webhook_url: Option<String>,
    /// Minimum size of `index.html` for the bundle to count as built.
    pub min_index_bytes: u64,
    /// Accepted for compatibility; no error-reporting client is linked.
    pub sentry_dsn: Option<String>,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `FUNDLINE_BIND_ADDR`: full bind address (overrides `PORT`)
    /// - `PORT`: port to bind on `0.0.0.0` (default: `5000`)
    /// - `FUNDLINE_ENV`, then `NODE_ENV`: `production` or `development`
    /// - `DATABASE_URL`: SQLite URL or path, or `memory` (default: `sqlite://analytics.db`)
    /// - `FUNDLINE_STATIC_DIR`: frontend bundle (default: `dist/public`)
    /// - `FUNDLINE_LOG_LEVEL`: log filter (default: `info`)
    /// - `FUNDLINE_RATE_LIMIT_PER_MINUTE`: per-IP POST limit (default: `100`)
    /// - `FUNDLINE_MAX_IN_FLIGHT`: concurrency ceiling (default: `100`)
    /// - `FUNDLINE_MAX_QUEUE`: wait queue length (default: `200`)
    /// - `FUNDLINE_QUEUE_TIMEOUT_MS`: max queue wait (default: `5000`)
    /// - `FUNDLINE_TRUST_PROXY`: honor `X-Forwarded-For` (default: `false`)
    /// - `FUNDLINE_CORS_ORIGINS`: comma-separated allowed origins
    /// - `FUNDLINE_ADMIN_TOKEN`: enables `/api/analytics/summary`
    /// - `FUNDLINE_LEAD_WEBHOOK_URL`: forward leads to this URL
    /// - `FUNDLINE_MIN_INDEX_BYTES`: bundle check threshold (default: `256`)
    /// - `SENTRY_DSN`: accepted, logged as unsupported
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedDatabase`] when `DATABASE_URL` is
    /// not a SQLite URL, a file path, or `memory`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| {
            non_empty(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false)
        };

        // Priority: FUNDLINE_BIND_ADDR > PORT > default 0.0.0.0:5000
        let default_addr = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT));
        let bind_addr = if let Some(addr) = non_empty("FUNDLINE_BIND_ADDR") {
            addr.parse().unwrap_or(default_addr)
        } else if let Some(port) = non_empty("PORT") {
            SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(DEFAULT_PORT)))
        } else {
            default_addr
        };

        let environment = match non_empty("FUNDLINE_ENV")
            .or_else(|| non_empty("NODE_ENV"))
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            Some("production" | "prod") => Environment::Production,
            _ => Environment::Development,
        };

        let store = parse_store(non_empty("DATABASE_URL").as_deref())?;

        let static_dir = non_empty("FUNDLINE_STATIC_DIR")
            .map_or_else(|| PathBuf::from("dist/public"), PathBuf::from);

        let log_level = non_empty("FUNDLINE_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let rate_limit_per_minute = non_empty("FUNDLINE_RATE_LIMIT_PER_MINUTE")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(100);

        let max_in_flight = non_empty("FUNDLINE_MAX_IN_FLIGHT")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(100);

        let max_queue = non_empty("FUNDLINE_MAX_QUEUE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(200);

        let queue_timeout = Duration::from_millis(
            non_empty("FUNDLINE_QUEUE_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
        );

        let cors_origins = non_empty("FUNDLINE_CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let min_index_bytes = non_empty("FUNDLINE_MIN_INDEX_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(256);

        Ok(Self {
            bind_addr,
            environment,
            store,
            static_dir,
            log_level,
            rate_limit_per_minute,
            max_in_flight,
            max_queue,
            queue_timeout,
            trust_proxy: flag("FUNDLINE_TRUST_PROXY"),
            cors_origins,
            admin_token: non_empty("FUNDLINE_ADMIN_TOKEN"),
            lead_webhook_url: non_empty("FUNDLINE_LEAD_WEBHOOK_URL"),
            min_index_bytes,
            sentry_dsn: non_empty("SENTRY_DSN"),
        })
    }
}

/// Map `DATABASE_URL` onto a store backend.
///
/// Bare paths are treated as SQLite files so `DATABASE_URL=./analytics.db`
/// works the same as `sqlite://./analytics.db`. Any other `scheme://` URL is
/// rejected; only the scheme goes into the error so credentials never reach
/// the log.
fn parse_store(raw: Option<&str>) -> Result<StoreBackend, ConfigError> {
    let backend = match raw.map(str::trim) {
        None => StoreBackend::Sqlite {
            url: "sqlite://analytics.db".to_owned(),
        },
        Some(v) if v.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
        Some(v) if v.starts_with("sqlite:") => StoreBackend::Sqlite { url: v.to_owned() },
        Some(v) if v.contains("://") => {
            let scheme = v.split("://").next().unwrap_or_default().to_owned();
            return Err(ConfigError::UnsupportedDatabase { scheme });
        }
        Some(path) => StoreBackend::Sqlite {
            url: format!("sqlite://{path}"),
        },
    };
    Ok(backend)
}
