use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tl_core::types::EventKind;
use tl_core::Tally;
use tl_db::schema;
use tl_db::store::DbStore;
use tl_serve::config::CapturePolicy;
use tl_serve::middleware::capture::CaptureLayer;
use tl_serve::{app, AppState};
use tower::ServiceExt;

struct Harness {
    _dir: TempDir,
    db_path: String,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("analytics.db").display().to_string();
        schema::open_and_migrate(&db_path).unwrap();
        Self { _dir: dir, db_path }
    }

    /// Points at a database whose parent directory does not exist.
    fn unreachable() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir
            .path()
            .join("missing")
            .join("analytics.db")
            .display()
            .to_string();
        Self { _dir: dir, db_path }
    }

    fn state(&self) -> AppState {
        AppState::new(self.db_path.clone(), CapturePolicy::default())
    }

    fn tally(&self) -> Tally<DbStore> {
        Tally::new(DbStore::new(schema::open_and_migrate(&self.db_path).unwrap()))
    }

    fn total_events(&self) -> u64 {
        self.tally().analytics().activity(Some(1), Some(1)).unwrap().pagination.total
    }
}

fn track_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("user-agent", "curl/8.5.0")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-actor-id", "admin-1")
        .header("x-actor-role", "admin")
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_events(harness: &Harness, expected: u64) -> u64 {
    let mut seen = 0;
    for _ in 0..100 {
        seen = harness.total_events();
        if seen >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    seen
}

#[tokio::test]
async fn track_stores_event_with_server_side_context() {
    let harness = Harness::new();
    let response = app(harness.state())
        .oneshot(track_request(
            "/analytics/track",
            &json!({
                "pageUrl": "/pricing",
                "sessionId": "sess_a",
                "eventType": "action",
                "eventData": {"action": "click", "target": "buy"}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"success": true}));

    let page = harness.tally().analytics().activity(None, None).unwrap();
    assert_eq!(page.pagination.total, 1);
    let event = &page.activities[0].event;
    assert_eq!(event.page_url, "/pricing");
    assert_eq!(event.kind, EventKind::Action);
    assert_eq!(event.network_origin, "203.0.113.7");
    assert_eq!(event.client_agent, "curl/8.5.0");
    assert_eq!(event.attributes["target"], "buy");
}

#[tokio::test]
async fn track_rejects_missing_fields_and_unknown_kinds() {
    let harness = Harness::new();
    let missing = app(harness.state())
        .oneshot(track_request("/analytics/track", &json!({"pageUrl": "/x"})))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body = body_json(missing).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "invalid_input");

    let unknown = app(harness.state())
        .oneshot(track_request(
            "/analytics/track",
            &json!({"pageUrl": "/x", "sessionId": "s", "eventType": "scroll"}),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    assert_eq!(harness.total_events(), 0);
}

#[tokio::test]
async fn track_reports_store_failure() {
    let harness = Harness::unreachable();
    let body = json!({"pageUrl": "/x", "sessionId": "s"});

    let strict = app(harness.state())
        .oneshot(track_request("/analytics/track", &body))
        .await
        .unwrap();
    assert_eq!(strict.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(strict).await["code"], "store_unavailable");

    let soft = app(harness.state())
        .oneshot(track_request("/analytics/track?soft=true", &body))
        .await
        .unwrap();
    assert_eq!(soft.status(), StatusCode::OK);
    assert_eq!(body_json(soft).await, json!({"success": false}));
}

#[tokio::test]
async fn soft_tracking_still_rejects_invalid_events() {
    let harness = Harness::new();
    let response = app(harness.state())
        .oneshot(track_request(
            "/analytics/track?soft=true",
            &json!({"pageUrl": "/x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "invalid_input");

    let accepted = app(harness.state())
        .oneshot(track_request(
            "/analytics/track?soft=true",
            &json!({"pageUrl": "/x", "sessionId": "s"}),
        ))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(body_json(accepted).await, json!({"success": true}));
    assert_eq!(harness.total_events(), 1);
}

#[tokio::test]
async fn unreadable_bodies_answer_with_the_error_envelope() {
    let harness = Harness::new();
    let malformed = app(harness.state())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analytics/track")
                .header("content-type", "application/json")
                .body(Body::from("{\"pageUrl\": "))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let body = body_json(malformed).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "invalid_input");

    let untyped = app(harness.state())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analytics/track")
                .body(Body::from(r#"{"pageUrl": "/x", "sessionId": "s"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(untyped.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(untyped).await["code"], "invalid_input");

    let mistyped = app(harness.state())
        .oneshot(track_request(
            "/analytics/track",
            &json!({"pageUrl": 42, "sessionId": "s"}),
        ))
        .await
        .unwrap();
    assert_eq!(mistyped.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(mistyped).await["code"], "invalid_input");

    assert_eq!(harness.total_events(), 0);
}

#[tokio::test]
async fn analytics_requires_admin() {
    let harness = Harness::new();
    let anonymous = app(harness.state())
        .oneshot(
            Request::builder()
                .uri("/analytics/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let member = app(harness.state())
        .oneshot(
            Request::builder()
                .uri("/analytics/activity")
                .header("x-actor-id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(member.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_reads_stats_visitors_and_activity() {
    let harness = Harness::new();
    for (page, session) in [("/a", "s1"), ("/a", "s1"), ("/b", "s2"), ("/c", "s3")] {
        let response = app(harness.state())
            .oneshot(track_request(
                "/analytics/track",
                &json!({"pageUrl": page, "sessionId": session}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let stats = body_json(
        app(harness.state())
            .oneshot(admin_get("/analytics/stats"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(stats["totalPageViews"], 4);
    assert_eq!(stats["uniqueVisitors"]["day"], 3);
    assert_eq!(stats["popularPages"][0]["pageUrl"], "/a");
    assert_eq!(stats["popularPages"][0]["count"], 2);

    let visitors = body_json(
        app(harness.state())
            .oneshot(admin_get("/analytics/visitors?days=30"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(visitors["count"], 3);
    assert_eq!(visitors["period"], "30 days");

    let activity = body_json(
        app(harness.state())
            .oneshot(admin_get("/analytics/activity?page=2&limit=3"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(activity["pagination"]["total"], 4);
    assert_eq!(activity["pagination"]["pages"], 2);
    assert_eq!(activity["activities"].as_array().unwrap().len(), 1);
    assert_eq!(activity["activities"][0]["pageUrl"], "/a");
}

#[tokio::test]
async fn popular_limit_is_clamped() {
    let harness = Harness::new();
    for page in ["/a", "/a", "/b"] {
        app(harness.state())
            .oneshot(track_request(
                "/analytics/track",
                &json!({"pageUrl": page, "sessionId": "s1"}),
            ))
            .await
            .unwrap();
    }

    let single = body_json(
        app(harness.state())
            .oneshot(admin_get("/analytics/popular?limit=0"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(single.as_array().unwrap().len(), 1);
    assert_eq!(single[0]["pageUrl"], "/a");

    let huge = app(harness.state())
        .oneshot(admin_get("/analytics/popular?limit=4000000000"))
        .await
        .unwrap();
    assert_eq!(huge.status(), StatusCode::OK);
    assert_eq!(body_json(huge).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_window_is_a_bad_request() {
    let harness = Harness::new();
    let response = app(harness.state())
        .oneshot(admin_get("/analytics/visitors?days=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn capture_records_page_views_and_api_calls() {
    let harness = Harness::new();
    let host = Router::new()
        .route("/dashboard", get(|| async { "dashboard" }))
        .route("/api/profile", get(|| async { "profile" }))
        .layer(CaptureLayer::new(harness.state()));

    for uri in ["/dashboard?tab=1", "/api/profile"] {
        let response = host
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("x-session-id", "sess_host")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(wait_for_events(&harness, 2).await, 2);
    let page = harness.tally().analytics().activity(None, None).unwrap();
    let mut kinds: Vec<_> = page
        .activities
        .iter()
        .map(|entry| (entry.event.page_url.clone(), entry.event.kind))
        .collect();
    kinds.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        kinds,
        vec![
            ("/api/profile".to_string(), EventKind::ApiCall),
            ("/dashboard".to_string(), EventKind::PageView),
        ]
    );
    assert!(page
        .activities
        .iter()
        .all(|entry| entry.event.session_id == "sess_host"));
}

#[tokio::test]
async fn capture_skips_ignored_paths() {
    let harness = Harness::new();
    let host = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/static/app.css", get(|| async { "body{}" }))
        .layer(CaptureLayer::new(harness.state()));

    for uri in ["/health", "/static/app.css"] {
        let response = host
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.total_events(), 0);
}

#[tokio::test]
async fn capture_is_transparent_when_store_is_down() {
    let harness = Harness::unreachable();
    let host = Router::new()
        .route(
            "/teapot",
            get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        )
        .layer(CaptureLayer::new(harness.state()));

    let response = host
        .oneshot(Request::builder().uri("/teapot").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"short and stout");
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let harness = Harness::new();
    let health = app(harness.state())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(health).await, json!({"status": "ok"}));

    let doc = body_json(
        app(harness.state())
            .oneshot(
                Request::builder()
                    .uri("/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;
    assert!(doc["paths"]["/analytics/track"].is_object());
    assert_eq!(harness.total_events(), 0);
}
