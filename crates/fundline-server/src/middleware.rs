//! Request admission middleware.
//!
//! Two gates sit in front of the handlers:
//!
//! - [`load_shed_middleware`] caps concurrent requests. Requests past the
//!   ceiling wait in a bounded queue (tokio's semaphore is fair, so waiters
//!   are served roughly in arrival order); when the queue is full or the wait
//!   times out the request is rejected with 503.
//! - [`rate_limit_middleware`] applies a fixed one-minute window per client
//!   IP to POSTs and rejects the excess with 429. It is installed as a route
//!   layer on the `/api` router only, so the path is already scoped.
//!
//! Windows are measured on tokio's clock so tests can pause and advance it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::AppError;
use crate::state::AppState;

/// Length of a rate-limit window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

// ── Rate limiting ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted; `remaining` more are allowed in this window.
    Allowed { remaining: u32 },
    /// Request rejected; the window resets after `retry_after`.
    Limited { retry_after: Duration },
}

/// Fixed-window request counter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request from `client` at `now`.
    pub async fn check(&self, client: &str, now: Instant) -> RateDecision {
        let mut clients = self.clients.lock().await;
        let entry = clients.entry(client.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let retry_after = self
                .window
                .saturating_sub(now.saturating_duration_since(entry.started));
            return RateDecision::Limited { retry_after };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.limit - entry.count,
        }
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub async fn prune(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub async fn tracked(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// Resolve the client address used as the rate-limit key.
///
/// With `trust_proxy`, the first `X-Forwarded-For` hop wins. Otherwise the
/// socket peer address is used, falling back to `"unknown"` when the server
/// was not started with connect info (e.g. in tests).
pub fn client_ip(req: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_owned();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_owned(), |ConnectInfo(addr)| addr.ip().to_string())
}

/// Middleware that rate-limits POSTs per client IP.
///
/// Runs inside the nested `/api` router, where the URI has already lost its
/// `/api` prefix; only the method is inspected.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }

    let client = client_ip(&req, state.trust_proxy);
    match state.rate_limiter.check(&client, Instant::now()).await {
        RateDecision::Allowed { .. } => next.run(req).await,
        RateDecision::Limited { retry_after } => {
            let path = req
                .extensions()
                .get::<OriginalUri>()
                .map_or_else(|| req.uri().path(), |uri| uri.path());
            tracing::debug!(
                client = %client,
                path = %path,
                retry_after_secs = retry_after.as_secs(),
                "rate limit exceeded"
            );
            AppError::TooManyRequests { retry_after }.into_response()
        }
    }
}

// ── Load shedding ────────────────────────────────────────────────────

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShedReason {
    /// The wait queue was already full.
    QueueFull,
    /// The request waited longer than the queue timeout.
    Timeout,
}

/// Concurrency ceiling with a bounded wait queue.
#[derive(Debug)]
pub struct LoadShedder {
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    max_queue: usize,
    queue_timeout: Duration,
}

impl LoadShedder {
    #[must_use]
    pub fn new(max_in_flight: usize, max_queue: usize, queue_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            waiting: AtomicUsize::new(0),
            max_queue,
            queue_timeout,
        }
    }

    /// Take a slot, queueing if the server is at its ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`ShedReason`] when the queue is full or the wait times out.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ShedReason> {
        if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            return Ok(permit);
        }

        let queued = self.waiting.fetch_add(1, Ordering::SeqCst);
        if queued >= self.max_queue {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(ShedReason::QueueFull);
        }

        let result = tokio::time::timeout(
            self.queue_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(Ok(permit)) => Ok(permit),
            // The semaphore is never closed; treat it like a timeout anyway.
            Ok(Err(_)) | Err(_) => Err(ShedReason::Timeout),
        }
    }

    /// Requests currently waiting for a slot.
    pub fn queued(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Middleware that holds a [`LoadShedder`] slot for the whole request.
pub async fn load_shed_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    match state.load_shedder.acquire().await {
        Ok(_permit) => next.run(req).await,
        Err(reason) => {
            tracing::warn!(
                ?reason,
                path = %req.uri().path(),
                queued = state.load_shedder.queued(),
                available = state.load_shedder.available(),
                "shedding request"
            );
            AppError::Overloaded {
                retry_after: Duration::from_secs(1),
            }
            .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn limiter_blocks_after_threshold_and_resets() {
        let limiter = RateLimiter::new(3, RATE_WINDOW);
        let t0 = Instant::now();

        for expected in [2, 1, 0] {
            assert_eq!(
                limiter.check("10.0.0.1", t0).await,
                RateDecision::Allowed {
                    remaining: expected
                }
            );
        }

        let later = t0 + Duration::from_secs(20);
        match limiter.check("10.0.0.1", later).await {
            RateDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(40));
            }
            RateDecision::Allowed { .. } => unreachable!("fourth request must be limited"),
        }

        match limiter.check("10.0.0.1", t0 + Duration::from_secs(50)).await {
            RateDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(10));
            }
            RateDecision::Allowed { .. } => unreachable!("window has not reset yet"),
        }

        // Other clients have their own budget.
        assert!(matches!(
            limiter.check("10.0.0.2", later).await,
            RateDecision::Allowed { .. }
        ));

        let next_window = t0 + RATE_WINDOW;
        assert_eq!(
            limiter.check("10.0.0.1", next_window).await,
            RateDecision::Allowed { remaining: 2 }
        );
    }

    #[tokio::test]
    async fn prune_drops_only_expired_windows() {
        let limiter = RateLimiter::new(5, RATE_WINDOW);
        let t0 = Instant::now();
        limiter.check("old", t0).await;
        limiter.check("new", t0 + Duration::from_secs(50)).await;

        let removed = limiter.prune(t0 + Duration::from_secs(70)).await;
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked().await, 1);
    }

    #[tokio::test]
    async fn shedder_rejects_when_queue_full() {
        let shedder = LoadShedder::new(1, 0, Duration::from_millis(50));
        assert_eq!(shedder.available(), 1);
        let held = shedder.acquire().await.unwrap();
        assert_eq!(shedder.available(), 0);
        assert_eq!(shedder.acquire().await.unwrap_err(), ShedReason::QueueFull);
        drop(held);
        assert_eq!(shedder.available(), 1);
        assert!(shedder.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn shedder_times_out_queued_requests() {
        let shedder = LoadShedder::new(1, 4, Duration::from_millis(20));
        let _held = shedder.acquire().await.unwrap();
        assert_eq!(shedder.acquire().await.unwrap_err(), ShedReason::Timeout);
        assert_eq!(shedder.queued(), 0);
    }

    #[tokio::test]
    async fn queued_request_gets_slot_when_released() {
        let shedder = Arc::new(LoadShedder::new(1, 4, Duration::from_secs(5)));
        let held = shedder.acquire().await.unwrap();

        let waiter = {
            let shedder = Arc::clone(&shedder);
            tokio::spawn(async move { shedder.acquire().await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(shedder.queued(), 1);

        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn client_ip_prefers_forwarded_header_only_when_trusted() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, true), "203.0.113.7");
        assert_eq!(client_ip(&req, false), "unknown");
    }

    #[test]
    fn client_ip_uses_connect_info() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 4], 40_000))));
        assert_eq!(client_ip(&req, false), "198.51.100.4");
    }
}
