//! Fundline server entry point.
//!
//! Verifies the frontend bundle, opens the analytics store, and starts the
//! Axum HTTP server with graceful shutdown. A background worker prunes
//! expired rate-limit windows and is cancelled on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use fundline_server::artifact;
use fundline_server::config::{ServerConfig, StoreBackend};
use fundline_server::routes;
use fundline_server::state::AppState;
use fundline_storage::{AnalyticsStore, MemoryStore, SqliteStore};

/// How often stale rate-limit windows are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    init_logging(&config);

    info!(
        environment = config.environment.as_str(),
        store = ?config.store,
        static_dir = %config.static_dir.display(),
        "Fundline starting"
    );

    if config.sentry_dsn.is_some() {
        warn!("SENTRY_DSN is set but no error-reporting client is built in; errors go to the log only");
    }

    check_bundle(&config)?;

    let store = open_store(&config).await?;
    let state = Arc::new(AppState::new(&config, store));

    if let Some(forwarder) = &state.lead_forwarder {
        info!(url = %forwarder.url(), "lead forwarding enabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let prune_handle = {
        let state = Arc::clone(&state);
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            rate_limit_pruner(state, &mut rx).await;
        })
    };

    let app = routes::build_router(Arc::clone(&state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Fundline server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await
    .context("server error")?;

    info!("waiting for background workers to stop");
    let _ = tokio::time::timeout(Duration::from_secs(5), prune_handle).await;

    info!("Fundline server stopped");
    Ok(())
}

/// Structured logging: JSON in production, human-readable otherwise.
/// `RUST_LOG` overrides the configured level.
fn init_logging(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    if config.environment.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Verify the frontend bundle. A broken bundle is fatal in production; in
/// development the server still starts so the API can be used on its own.
fn check_bundle(config: &ServerConfig) -> anyhow::Result<()> {
    let report = artifact::verify_bundle(&config.static_dir, config.min_index_bytes);
    if report.passed() {
        info!(dir = %report.dir.display(), "frontend bundle verified");
        return Ok(());
    }

    for failure in report.failures() {
        warn!(check = failure.name, detail = %failure.detail, "frontend bundle check failed");
    }

    if config.environment.is_production() {
        report
            .into_result()
            .context("refusing to start in production without a complete frontend bundle")?;
    } else {
        warn!("continuing without a complete frontend bundle (development mode)");
    }
    Ok(())
}

async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn AnalyticsStore>> {
    let store: Arc<dyn AnalyticsStore> = match &config.store {
        StoreBackend::Memory => {
            info!("using in-memory store (data will not persist)");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Sqlite { url } => {
            info!(url = %url, "using SQLite store");
            Arc::new(
                SqliteStore::connect(url)
                    .await
                    .context("failed to open SQLite store")?,
            )
        }
    };
    Ok(store)
}

/// Periodically drop rate-limit windows that have fully elapsed.
async fn rate_limit_pruner(state: Arc<AppState>, shutdown: &mut watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = state.rate_limiter.prune(Instant::now()).await;
                if removed > 0 {
                    tracing::debug!(removed, "pruned rate-limit windows");
                }
            }
            _ = shutdown.changed() => {
                info!("rate-limit pruner shutting down");
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
