mod common;

use access_service::models::AuthMode;
use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_security_routes_require_an_admin_session() {
    let app = TestApp::new();
    for (method, uri) in [
        (Method::GET, "/security/rate-limits"),
        (Method::GET, "/security/events"),
        (Method::DELETE, "/security/events?older_than_days=30"),
    ] {
        let res = app.send(method, uri, None, &[]).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_share_bearer_is_not_an_admin_session() {
    let app = TestApp::new();
    let p = app.seed_project(AuthMode::Password, true);
    let guest = app
        .send(Method::POST, &format!("/share/{}/guest", p), None, &[])
        .await;
    let bearer = format!("Bearer {}", guest.str_field("token"));

    let res = app
        .send(
            Method::GET,
            "/security/events",
            None,
            &[("authorization", bearer.as_str())],
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_events_are_listed_filtered_and_pruned() {
    let app = TestApp::new();
    app.seed_admin();
    let p = app.seed_project(AuthMode::Password, false);

    app.send(
        Method::POST,
        &format!("/share/{}/verify-password", p),
        Some(json!({ "password": "guess" })),
        &[],
    )
    .await;

    let login = app.login().await;
    let bearer = format!("Bearer {}", login.str_field("access_token"));
    let auth = [("authorization", bearer.as_str())];

    let all = app.send(Method::GET, "/security/events", None, &auth).await;
    assert_eq!(all.status, StatusCode::OK);
    let events = all.body["events"].as_array().unwrap();
    assert!(events
        .iter()
        .any(|e| e["event_type"] == "share_password_failed"));
    assert!(events
        .iter()
        .any(|e| e["event_type"] == "admin_login_success"));

    let filtered = app
        .send(
            Method::GET,
            "/security/events?event_type=share_password_failed",
            None,
            &auth,
        )
        .await;
    let filtered = filtered.body["events"].as_array().unwrap().clone();
    assert!(!filtered.is_empty());
    assert!(filtered
        .iter()
        .all(|e| e["event_type"] == "share_password_failed"));

    let bad_limit = app
        .send(Method::GET, "/security/events?limit=0", None, &auth)
        .await;
    assert_eq!(bad_limit.status, StatusCode::BAD_REQUEST);

    let unparsable = app
        .send(Method::GET, "/security/events?limit=lots", None, &auth)
        .await;
    assert_eq!(unparsable.status, StatusCode::BAD_REQUEST);
    assert!(unparsable.body["error"].is_string());

    // Fresh events are newer than any cutoff
    let pruned = app
        .send(
            Method::DELETE,
            "/security/events?older_than_days=1",
            None,
            &auth,
        )
        .await;
    assert_eq!(pruned.status, StatusCode::OK);
    assert_eq!(pruned.body["deleted"], 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_has_exactly_one_winner() {
    let app = TestApp::new();
    app.seed_admin();
    let login = app.login().await;
    let refresh = json!({ "refresh_token": login.str_field("refresh_token") });

    let (a, b) = tokio::join!(
        app.send(Method::POST, "/auth/refresh", Some(refresh.clone()), &[]),
        app.send(Method::POST, "/auth/refresh", Some(refresh.clone()), &[]),
    );

    let wins = [a.status, b.status]
        .iter()
        .filter(|s| **s == StatusCode::OK)
        .count();
    assert_eq!(wins, 1);

    let events = app.repo.security_events();
    assert!(events
        .iter()
        .any(|e| e.event_type == access_service::models::SecurityEventType::RefreshReplayDetected));
}

#[tokio::test]
async fn test_health_reports_dependencies() {
    let app = TestApp::new();
    let healthy = app.send(Method::GET, "/health", None, &[]).await;
    assert_eq!(healthy.status, StatusCode::OK);
    assert_eq!(healthy.body["status"], "healthy");

    app.store.set_available(false);
    let degraded = app.send(Method::GET, "/health", None, &[]).await;
    assert_eq!(degraded.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(degraded.body["store"], "down");
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let app = TestApp::new();
    let res = app.send(Method::GET, "/health", None, &[]).await;
    assert!(res.headers.contains_key("x-request-id"));
    assert!(res.headers.contains_key("x-content-type-options"));
}
