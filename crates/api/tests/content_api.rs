use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use church_api::{auth, build_app, AppConfig, AppState};
use church_core::events::SiteEvent;
use church_core::store::MemoryContentRepository;
use church_core::{webhook, EventBus, SyncAction};
use serde_json::{json, Value};
use tower::ServiceExt;

static SCRATCH: AtomicUsize = AtomicUsize::new(0);

fn scratch_dir(name: &str) -> PathBuf {
    let n = SCRATCH.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("church-api-{name}-{}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn test_config() -> AppConfig {
    AppConfig {
        admin_password_hash: Some(auth::hash_password("amazing-grace").unwrap()),
        upload_dir: scratch_dir("uploads"),
        ..AppConfig::default()
    }
}

fn app_with(config: AppConfig) -> (Router, AppState) {
    let state = AppState::new(Arc::new(MemoryContentRepository::new()), config, EventBus::new(64));
    (build_app(state.clone()), state)
}

fn token(state: &AppState) -> String {
    auth::issue_token(state.config(), "admin").unwrap().0
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_and_ping() {
    let (app, _) = app_with(test_config());
    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, _) = send(&app, get("/ping", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn writes_require_admin_token() {
    let (app, _) = app_with(test_config());
    let body = json!({"title": "Hello", "content": "World"});

    let (status, body_out) = send(&app, with_json("POST", "/api/blog", None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body_out["success"], false);

    let (status, _) = send(&app, with_json("POST", "/api/blog", Some("garbage"), body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Full listing is admin-only; the published views are not.
    let (status, _) = send(&app, get("/api/events", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, get("/api/events?published=true", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn invalid_body_lists_field_errors() {
    let (app, state) = app_with(test_config());
    let token = token(&state);

    let (status, body) = send(
        &app,
        with_json("POST", "/api/events", Some(&token), json!({"title": "Picnic", "date": "soon"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"location"));
    assert!(fields.contains(&"date"));
}

#[tokio::test]
async fn crud_round_trip_with_signals() {
    let (app, state) = app_with(test_config());
    let token = token(&state);
    let mut events = state.event_bus().subscribe();

    let (status, body) = send(
        &app,
        with_json(
            "POST",
            "/api/sermons",
            Some(&token),
            json!({"title": "Hope", "speaker": "Pastor Lee", "date": "2024-04-07", "status": "draft"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Sermon created successfully");
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert!(id.bytes().all(|b| b.is_ascii_digit()), "server ids are millis: {id}");
    match events.recv().await.unwrap() {
        SiteEvent::Sync(signal) => {
            assert_eq!(signal.action, SyncAction::Create);
            assert_eq!(signal.item_id(), Some(id.as_str()));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Drafts stay hidden from visitors.
    let (status, _) = send(&app, get(&format!("/api/sermons/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = send(&app, get("/api/sermons?published=true", None)).await;
    assert_eq!(body["data"], json!([]));

    let (status, body) = send(
        &app,
        with_json("PUT", &format!("/api/sermons/{id}"), Some(&token), json!({"status": "published"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "published");
    assert_eq!(body["data"]["speaker"], "Pastor Lee");

    let (status, body) = send(&app, get(&format!("/api/sermons/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Hope");
    let (_, body) = send(&app, get("/api/sermons/public", None)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let delete = Request::delete(format!("/api/sermons/{id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());

    let (status, body) = send(&app, get(&format!("/api/sermons/{id}"), Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Sermon not found");
}

#[tokio::test]
async fn blog_public_suffix_and_query_agree() {
    let (app, state) = app_with(test_config());
    let token = token(&state);
    for (title, status) in [("Live", "published"), ("Hidden", "draft")] {
        let body = json!({"title": title, "content": "...", "status": status});
        let (code, _) = send(&app, with_json("POST", "/api/blog", Some(&token), body)).await;
        assert_eq!(code, StatusCode::CREATED);
    }

    let (_, by_suffix) = send(&app, get("/api/blog/public", None)).await;
    let (_, by_query) = send(&app, get("/api/blog?published=true", None)).await;
    assert_eq!(by_suffix["data"], by_query["data"]);
    assert_eq!(by_suffix["data"][0]["title"], "Live");

    let (_, all) = send(&app, get("/api/blog", Some(&token))).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn login_issues_usable_token() {
    let (app, _) = app_with(test_config());

    let (status, _) = send(
        &app,
        with_json("POST", "/api/auth/login", None, json!({"username": "admin", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        with_json("POST", "/api/auth/login", None, json!({"username": "admin", "password": "amazing-grace"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "admin");
}

#[tokio::test]
async fn login_disabled_without_hash() {
    let (app, _) = app_with(AppConfig::default());
    let (status, _) = send(
        &app,
        with_json("POST", "/api/auth/login", None, json!({"username": "admin", "password": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn donations_validate_before_processor() {
    let (app, _) = app_with(test_config());

    let (status, body) = send(&app, with_json("POST", "/api/payments/intent", None, json!({"amount": 50}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "amount");

    let (status, _) = send(&app, with_json("POST", "/api/payments/intent", None, json!({"amount": 2500}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn webhook_checks_signature() {
    let mut config = test_config();
    config.payments.webhook_secret = Some("whsec_test".into());
    let (app, _) = app_with(config);
    let payload = json!({"type": "payment_intent.succeeded", "data": {"object": {"id": "pi_1"}}}).to_string();

    let signed = |signature: String| {
        Request::post("/api/payments/webhook")
            .header("stripe-signature", signature)
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let now = chrono::Utc::now().timestamp();
    let (status, body) = send(&app, signed(webhook::sign(payload.as_bytes(), "whsec_test", now))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let (status, _) = send(&app, signed(webhook::sign(payload.as_bytes(), "other", now))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stale = now - webhook::DEFAULT_TOLERANCE_SECS - 60;
    let (status, _) = send(&app, signed(webhook::sign(payload.as_bytes(), "whsec_test", stale))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn multipart(file_name: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "church-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

#[tokio::test]
async fn upload_stores_images_only() {
    let config = test_config();
    let upload_dir = config.upload_dir.clone();
    let (app, state) = app_with(config);
    let token = token(&state);

    let upload = |file_name: &str| {
        let (content_type, body) = multipart(file_name, b"\x89PNG fake image bytes");
        Request::post("/api/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    };

    let (status, body) = send(&app, upload("cross.PNG")).await;
    assert_eq!(status, StatusCode::CREATED);
    let path = body["data"]["path"].as_str().unwrap();
    assert!(path.starts_with("/uploads/") && path.ends_with(".png"));
    let stored = upload_dir.join(path.trim_start_matches("/uploads/"));
    let meta = tokio_test::assert_ok!(std::fs::metadata(&stored));
    assert!(meta.len() > 0);

    let (status, _) = send(&app, get(path, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, upload("notes.txt")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only image files are allowed");

    let _ = std::fs::remove_dir_all(upload_dir);
}
