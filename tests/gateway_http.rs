//! End-to-end tests driving the gateway through axum.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Json, Router,
};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use gatehouse::clock::ManualClock;
use gatehouse::config::GatehouseConfig;
use gatehouse::gateway::{admission_middleware, router, Gateway, Session, HEALTH_PATH};
use gatehouse::session::{Role, SessionPayload};

const SECRET: &str = "test-secret-key-for-testing-only-32chars";
const T0: u64 = 1_700_000_000_000;

fn test_config() -> GatehouseConfig {
    let mut config = GatehouseConfig::default();
    config.session.secret = SECRET.to_string();
    config.client_identity.trust_forwarded_header = true;
    config
}

fn test_gateway() -> (Arc<Gateway>, ManualClock) {
    let clock = ManualClock::new(T0);
    let gateway = Gateway::new(&test_config(), Arc::new(clock.clone())).unwrap();
    (Arc::new(gateway), clock)
}

fn session_cookie(gateway: &Gateway, role: Role) -> String {
    let payload = SessionPayload::new("Sam Rivera", "sam@example.com", role)
        .with_staff_id("STF-204")
        .with_record_id("recA1b2");
    format!("{}={}", gateway.cookie_name(), gateway.seal(&payload).unwrap())
}

fn get_request(path: &str, client: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path).header("x-forwarded-for", client);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A portal-style app with downstream handlers behind the gateway.
fn portal_app(gateway: Arc<Gateway>, hits: Arc<AtomicUsize>) -> Router {
    let admin_hits = Arc::clone(&hits);
    Router::new()
        .route(
            "/api/tasks",
            get(|Session(session): Session| async move {
                Json(serde_json::json!({ "owner": session.user_email }))
            }),
        )
        .route(
            "/admin/users",
            get(move || {
                let hits = Arc::clone(&admin_hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "user directory"
                }
            }),
        )
        .route("/api/login", get(|| async { "signed in" }))
        .route("/tasks/onboarding", get(|| async { "onboarding tasks" }))
        .layer(middleware::from_fn_with_state(gateway, admission_middleware))
}

#[tokio::test]
async fn test_strict_tier_throttles_sixth_login() {
    let (gateway, _) = test_gateway();
    let app = router(gateway);

    for i in 1..=5 {
        let response = app
            .clone()
            .oneshot(get_request("/api/login", "203.0.113.5", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "Request {} should pass", i);
    }

    let response = app
        .clone()
        .oneshot(get_request("/api/login", "203.0.113.5", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let body = body_json(response).await;
    assert!(body["error"].is_string());

    // Another client is unaffected
    let response = app
        .oneshot(get_request("/api/login", "203.0.113.6", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_window_rolls_over() {
    let (gateway, clock) = test_gateway();
    let app = router(gateway);

    for _ in 0..5 {
        app.clone()
            .oneshot(get_request("/api/signup", "198.51.100.20", None))
            .await
            .unwrap();
    }

    clock.advance(59_999);
    let response = app
        .clone()
        .oneshot(get_request("/api/signup", "198.51.100.20", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    clock.advance(1);
    let response = app
        .oneshot(get_request("/api/signup", "198.51.100.20", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_api_without_session_is_unauthorized() {
    let (gateway, _) = test_gateway();
    let app = router(gateway);

    let response = app
        .oneshot(get_request("/api/tasks", "192.0.2.44", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");
}

#[tokio::test]
async fn test_protected_page_without_session_redirects() {
    let (gateway, _) = test_gateway();
    let app = portal_app(gateway, Arc::new(AtomicUsize::new(0)));

    let response = app
        .oneshot(get_request("/tasks/onboarding", "192.0.2.44", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn test_expired_and_tampered_sessions_look_the_same() {
    let (gateway, clock) = test_gateway();
    let app = router(Arc::clone(&gateway));

    let cookie = session_cookie(&gateway, Role::User);
    let mut tampered = cookie.clone();
    tampered.pop();
    tampered.push_str("xyz");

    let response = app
        .clone()
        .oneshot(get_request("/api/tasks", "192.0.2.44", Some(&tampered)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let tampered_body = body_json(response).await;

    clock.advance(8 * 60 * 60 * 1000 + 1);
    let response = app
        .oneshot(get_request("/api/tasks", "192.0.2.44", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, tampered_body);
}

#[tokio::test]
async fn test_forward_auth_exposes_identity_headers() {
    let (gateway, _) = test_gateway();
    let cookie = session_cookie(&gateway, Role::Admin);
    let app = router(gateway);

    let response = app
        .oneshot(get_request("/admin/users", "192.0.2.44", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-auth-user-email"], "sam@example.com");
    assert_eq!(response.headers()["x-auth-user-role"], "admin");
    assert_eq!(response.headers()["x-auth-staff-id"], "STF-204");
    assert_eq!(response.headers()["x-auth-record-id"], "recA1b2");
}

fn subrequest(original_uri_header: &str, original: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/auth")
        .header("x-forwarded-for", "198.51.100.7")
        .header(original_uri_header, original);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_forward_auth_classifies_original_uri() {
    let (gateway, _) = test_gateway();
    let user_cookie = session_cookie(&gateway, Role::User);
    let admin_cookie = session_cookie(&gateway, Role::Admin);
    let app = router(gateway);

    let response = app
        .clone()
        .oneshot(subrequest("x-original-uri", "/admin/users", Some(&user_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!response.headers().contains_key("x-auth-user-role"));

    let response = app
        .oneshot(subrequest("x-forwarded-uri", "/admin/users", Some(&admin_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-auth-user-role"], "admin");
}

#[tokio::test]
async fn test_forward_auth_page_refusal_is_a_status() {
    let (gateway, _) = test_gateway();
    let app = router(gateway);

    let response = app
        .oneshot(subrequest("x-original-uri", "/tasks/onboarding", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!response.headers().contains_key(header::LOCATION));
}

#[tokio::test]
async fn test_forward_auth_throttles_original_uri() {
    let (gateway, _) = test_gateway();
    let app = router(gateway);

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(subrequest("x-original-uri", "/api/login", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(subrequest("x-original-uri", "/api/login", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forward_auth_ignores_original_uri_when_untrusted() {
    let mut config = test_config();
    config.client_identity.trust_forwarded_header = false;
    let gateway = Arc::new(Gateway::new(&config, Arc::new(ManualClock::new(T0))).unwrap());
    let app = router(gateway);

    // Classified as the public entry page named by the request itself
    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header("x-original-uri", "/admin/users")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_bypasses_gateway() {
    let (gateway, _) = test_gateway();
    let app = router(gateway);

    let response = app
        .oneshot(get_request(HEALTH_PATH, "192.0.2.44", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_user_role_never_reaches_admin_handler() {
    let (gateway, _) = test_gateway();
    let hits = Arc::new(AtomicUsize::new(0));
    let app = portal_app(Arc::clone(&gateway), Arc::clone(&hits));

    let user_cookie = session_cookie(&gateway, Role::User);
    let response = app
        .clone()
        .oneshot(get_request("/admin/users", "192.0.2.80", Some(&user_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/?mode=admin");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let admin_cookie = session_cookie(&gateway, Role::Admin);
    let response = app
        .oneshot(get_request("/admin/users", "192.0.2.80", Some(&admin_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_admin_api_forbidden_for_user() {
    let (gateway, _) = test_gateway();
    let cookie = session_cookie(&gateway, Role::User);
    let app = router(gateway);

    let response = app
        .oneshot(get_request(
            "/api/admin/dashboard/current-user",
            "192.0.2.80",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Forbidden");
}

#[tokio::test]
async fn test_downstream_handler_receives_session() {
    let (gateway, _) = test_gateway();
    let hits = Arc::new(AtomicUsize::new(0));
    let cookie = session_cookie(&gateway, Role::User);
    let app = portal_app(gateway, hits);

    let response = app
        .oneshot(get_request("/api/tasks", "192.0.2.80", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["owner"], "sam@example.com");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_relaxed_requests_admit_exactly_limit() {
    let (gateway, _) = test_gateway();
    let cookie = session_cookie(&gateway, Role::User);
    let app = router(gateway);

    let requests = (0..61).map(|_| {
        let app = app.clone();
        let cookie = cookie.clone();
        tokio::spawn(async move {
            app.oneshot(get_request("/api/tasks", "203.0.113.99", Some(&cookie)))
                .await
                .unwrap()
                .status()
        })
    });

    let statuses: Vec<StatusCode> = futures::future::join_all(requests)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let allowed = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let rejected = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();

    assert_eq!(allowed, 60);
    assert_eq!(rejected, 1);
}
