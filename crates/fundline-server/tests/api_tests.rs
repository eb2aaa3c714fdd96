//! End-to-end tests for the Fundline router.
//!
//! Each test builds the full middleware stack over an in-memory store and a
//! temporary frontend bundle, then drives it with `oneshot` requests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use fundline_server::config::{ServerConfig, StoreBackend};
use fundline_server::routes::build_router;
use fundline_server::state::AppState;
use fundline_storage::{AnalyticsStore, MemoryStore};

struct Harness {
    state: Arc<AppState>,
    store: MemoryStore,
    _bundle: TempDir,
}

impl Harness {
    fn new(tweak: impl FnOnce(&mut ServerConfig)) -> Self {
        let bundle = tempfile::tempdir().unwrap();
        write_bundle(bundle.path());

        let mut config = ServerConfig::from_lookup(|_| None).unwrap();
        config.store = StoreBackend::Memory;
        config.static_dir = bundle.path().to_path_buf();
        tweak(&mut config);

        let store = MemoryStore::new();
        let state = Arc::new(AppState::new(&config, Arc::new(store.clone())));
        Self {
            state,
            store,
            _bundle: bundle,
        }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        build_router(Arc::clone(&self.state))
            .oneshot(req)
            .await
            .unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: &Value) -> Response {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

fn write_bundle(dir: &Path) {
    fs::create_dir_all(dir.join("assets")).unwrap();
    fs::write(
        dir.join("index.html"),
        "<!doctype html><html><head><title>Funding</title>\
         <script type=\"module\" src=\"/assets/index-4f2a.js\"></script></head>\
         <body><div id=\"root\"></div></body></html>",
    )
    .unwrap();
    fs::write(dir.join("assets/index-4f2a.js"), "export const x = 1;").unwrap();
    fs::write(dir.join("assets/index-9c1d.css"), "body{margin:0}").unwrap();
    fs::write(dir.join("assets/logo.svg"), "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();
    fs::write(dir.join("robots.txt"), "User-agent: *\n").unwrap();
}

async fn json_body(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn content_type(resp: &Response) -> String {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_owned())
        .unwrap_or_default()
}

fn valid_lead() -> Value {
    json!({
        "name": "Maria Chen",
        "email": "maria@chenlogistics.com",
        "phone": "+1 (555) 123-4567",
        "company": "Chen Logistics",
        "funding_amount": "100k_250k",
        "message": "Looking for working capital",
        "source_page": "/solutions/working-capital"
    })
}

// ── Analytics ────────────────────────────────────────────────────────

#[tokio::test]
async fn session_start_creates_exactly_one_row() {
    let h = Harness::new(|_| {});
    let resp = h
        .post(
            "/api/analytics/session-start",
            &json!({"session_id": "sess_abc123", "entry_page": "/"}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["session"]["session_id"], "sess_abc123");

    let sessions = h.store.list_sessions(100).await.unwrap();
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn duplicate_session_start_overwrites() {
    let h = Harness::new(|_| {});
    for page in ["/", "/industries/restaurants"] {
        let resp = h
            .post(
                "/api/analytics/session-start",
                &json!({"session_id": "sess_dup", "entry_page": page}),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let sessions = h.store.list_sessions(100).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].entry_page, "/industries/restaurants");
}

#[tokio::test]
async fn session_end_unknown_is_404_json() {
    let h = Harness::new(|_| {});
    let resp = h
        .post(
            "/api/analytics/session-end",
            &json!({"session_id": "never-started", "exit_page": "/"}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["error"], "not_found");
}

#[tokio::test]
async fn session_end_closes_session() {
    let h = Harness::new(|_| {});
    h.post(
        "/api/analytics/session-start",
        &json!({"session_id": "s1", "entry_page": "/"}),
    )
    .await;
    let resp = h
        .post(
            "/api/analytics/session-end",
            &json!({"session_id": "s1", "exit_page": "/apply"}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["session"]["exit_page"], "/apply");
    assert!(!body["session"]["end_ts"].is_null());
}

#[tokio::test]
async fn event_is_appended() {
    let h = Harness::new(|_| {});
    let resp = h
        .post(
            "/api/analytics/event",
            &json!({
                "session_id": "s1",
                "page_path": "/faq",
                "event_type": "click",
                "element_id": "faq-item-3"
            }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(json_body(resp).await["event"]["event_type"], "click");
    assert_eq!(h.store.list_events("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_event_type_is_rejected() {
    let h = Harness::new(|_| {});
    let resp = h
        .post(
            "/api/analytics/event",
            &json!({"session_id": "s1", "page_path": "/", "event_type": "scroll"}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.store.list_events("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_is_all_or_nothing_on_validation() {
    let h = Harness::new(|_| {});
    let resp = h
        .post(
            "/api/analytics/events",
            &json!({"events": [
                {"session_id": "s1", "page_path": "/", "event_type": "navigation"},
                {"session_id": "s1", "page_path": "no-slash", "event_type": "click"}
            ]}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.store.list_events("s1").await.unwrap().is_empty());

    let resp = h
        .post(
            "/api/analytics/events",
            &json!({"events": [
                {"session_id": "s1", "page_path": "/", "event_type": "navigation"},
                {"session_id": "s1", "page_path": "/", "event_type": "performance", "value": 1234.0}
            ]}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(json_body(resp).await["recorded"], 2);
}

#[tokio::test]
async fn summary_requires_configured_token() {
    let h = Harness::new(|_| {});
    assert_eq!(
        h.get("/api/analytics/summary").await.status(),
        StatusCode::NOT_FOUND
    );

    let h = Harness::new(|c| c.admin_token = Some("s3cret".to_owned()));
    assert_eq!(
        h.get("/api/analytics/summary").await.status(),
        StatusCode::UNAUTHORIZED
    );

    let wrong = Request::get("/api/analytics/summary")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(h.send(wrong).await.status(), StatusCode::UNAUTHORIZED);

    h.post(
        "/api/analytics/session-start",
        &json!({"session_id": "s1", "entry_page": "/"}),
    )
    .await;
    let ok = Request::get("/api/analytics/summary?top=5")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let resp = h.send(ok).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["sessions"], 1);
}

// ── Leads ────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_lead_is_stored() {
    let h = Harness::new(|_| {});
    let resp = h.post("/api/leads", &valid_lead()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["id"], 1);

    let resp = h.post("/api/contact", &valid_lead()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(h.store.list_leads(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_lead_names_the_field() {
    let h = Harness::new(|_| {});
    let mut lead = valid_lead();
    lead["email"] = json!("not-an-email");
    let resp = h.post("/api/leads", &lead).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].as_str().unwrap().contains("email"));
    assert!(h.store.list_leads(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_is_400_json() {
    let h = Harness::new(|_| {});
    let resp = h
        .send(
            Request::post("/api/leads")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "bad_request");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let h = Harness::new(|_| {});
    let mut lead = valid_lead();
    lead["message"] = json!("x".repeat(100 * 1024));
    let resp = h.post("/api/leads", &lead).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ── Admission control ────────────────────────────────────────────────

#[tokio::test]
async fn rate_limit_returns_429_past_threshold() {
    let h = Harness::new(|c| c.rate_limit_per_minute = 3);
    let body = json!({"session_id": "s1", "entry_page": "/"});

    for _ in 0..3 {
        let resp = h.post("/api/analytics/session-start", &body).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = h.post("/api/analytics/session-start", &body).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = resp.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry));
    assert_eq!(json_body(resp).await["error"], "rate_limited");

    // Reads are not rate-limited.
    assert_eq!(h.get("/api/health").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_is_per_forwarded_ip_behind_proxy() {
    let h = Harness::new(|c| {
        c.rate_limit_per_minute = 1;
        c.trust_proxy = true;
    });
    let post_from = |ip: &'static str| {
        Request::post("/api/analytics/session-start")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(
                json!({"session_id": "s1", "entry_page": "/"}).to_string(),
            ))
            .unwrap()
    };

    assert_eq!(h.send(post_from("203.0.113.1")).await.status(), StatusCode::OK);
    assert_eq!(
        h.send(post_from("203.0.113.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(h.send(post_from("203.0.113.2")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn only_api_posts_count_against_limit() {
    let h = Harness::new(|c| c.rate_limit_per_minute = 1);

    for _ in 0..3 {
        assert_eq!(h.get("/api/health").await.status(), StatusCode::OK);
    }
    let page_post = h
        .send(Request::post("/").body(Body::empty()).unwrap())
        .await;
    assert_ne!(page_post.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = json!({"session_id": "s1", "entry_page": "/"});
    assert_eq!(
        h.post("/api/analytics/session-start", &body).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        h.post("/api/analytics/session-start", &body).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    // Still readable once the write budget is spent.
    assert_eq!(h.get("/api/health").await.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn retry_after_counts_down_and_window_resets() {
    let h = Harness::new(|c| c.rate_limit_per_minute = 1);
    let body = json!({"session_id": "s1", "entry_page": "/"});
    let retry_after = |resp: &Response| -> u64 {
        resp.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap()
    };

    assert_eq!(
        h.post("/api/analytics/session-start", &body).await.status(),
        StatusCode::OK
    );
    let resp = h.post("/api/analytics/session-start", &body).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(retry_after(&resp), 60);

    tokio::time::advance(Duration::from_secs(45)).await;
    let resp = h.post("/api/analytics/session-start", &body).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(retry_after(&resp), 15);

    tokio::time::advance(Duration::from_secs(15)).await;
    assert_eq!(
        h.post("/api/analytics/session-start", &body).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn saturated_server_sheds_with_503() {
    let h = Harness::new(|c| {
        c.max_in_flight = 1;
        c.max_queue = 0;
    });
    let held = h.state.load_shedder.acquire().await.unwrap();

    let resp = h.get("/api/health").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(json_body(resp).await["error"], "overloaded");

    drop(held);
    assert_eq!(h.get("/api/health").await.status(), StatusCode::OK);
}

// ── Static serving ───────────────────────────────────────────────────

#[tokio::test]
async fn assets_have_extension_content_types() {
    let h = Harness::new(|_| {});

    let js = h.get("/assets/index-4f2a.js").await;
    assert_eq!(js.status(), StatusCode::OK);
    assert!(content_type(&js).contains("javascript"), "{}", content_type(&js));
    assert_eq!(
        js.headers()[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );

    let css = h.get("/assets/index-9c1d.css").await;
    assert!(content_type(&css).starts_with("text/css"));

    let svg = h.get("/assets/logo.svg").await;
    assert!(content_type(&svg).starts_with("image/svg+xml"));
}

#[tokio::test]
async fn missing_asset_is_404_not_index() {
    let h = Harness::new(|_| {});
    let resp = h.get("/assets/index-stale.js").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn client_routes_fall_back_to_index() {
    let h = Harness::new(|_| {});
    for path in ["/", "/solutions/equipment-financing", "/industries/trucking"] {
        let resp = h.get(path).await;
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
        assert!(content_type(&resp).starts_with("text/html"));
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
        assert!(text_body(resp).await.contains("id=\"root\""));
    }

    let robots = h.get("/robots.txt").await;
    assert!(content_type(&robots).starts_with("text/plain"));
}

#[tokio::test]
async fn unknown_api_path_is_json_404() {
    let h = Harness::new(|_| {});
    let resp = h.get("/api/does-not-exist").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(json_body(resp).await["error"], "not_found");
}

#[tokio::test]
async fn security_headers_are_set() {
    let h = Harness::new(|_| {});
    let resp = h.get("/").await;
    let headers = resp.headers();
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
    assert!(headers[header::CONTENT_SECURITY_POLICY]
        .to_str()
        .unwrap()
        .contains("https://www.googletagmanager.com"));
    assert!(!headers.contains_key(header::STRICT_TRANSPORT_SECURITY));

    let prod = Harness::new(|c| {
        c.environment = fundline_server::config::Environment::Production;
    });
    let resp = prod.get("/").await;
    assert!(resp.headers().contains_key(header::STRICT_TRANSPORT_SECURITY));
}

#[tokio::test]
async fn health_reports_ok() {
    let h = Harness::new(|_| {});
    let resp = h.get("/api/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["environment"], "development");
}
