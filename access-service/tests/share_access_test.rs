mod common;

use access_service::models::AuthMode;
use axum::http::{Method, StatusCode};
use common::{TestApp, SHARE_PASSWORD};
use serde_json::json;

fn cookie_header(session: &str) -> String {
    format!("share_session={}", session)
}

#[tokio::test]
async fn test_password_unlocks_only_that_project() {
    let app = TestApp::new();
    let a = app.seed_project(AuthMode::Password, false);
    let b = app.seed_project(AuthMode::Password, false);

    let wrong = app
        .send(
            Method::POST,
            &format!("/share/{}/verify-password", a),
            Some(json!({ "password": "not-it", "email": "viewer@example.com" })),
            &[],
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body, json!({ "error": "Invalid or expired code" }));
    assert!(wrong.cookie("share_session").is_none());

    let ok = app
        .send(
            Method::POST,
            &format!("/share/{}/verify-password", a),
            Some(json!({ "password": SHARE_PASSWORD })),
            &[],
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let raw = ok.set_cookie_header("share_session").expect("cookie set");
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("SameSite=Lax"));
    assert!(raw.contains("Secure"));
    assert!(raw.contains("Max-Age=86400"));

    let session = ok.cookie("share_session").unwrap();
    let cookie = cookie_header(&session);

    let access_a = app
        .send(
            Method::GET,
            &format!("/share/{}/access", a),
            None,
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(access_a.status, StatusCode::OK);
    assert_eq!(access_a.body["authorized"], true);
    assert_eq!(access_a.body["is_guest"], false);

    let access_b = app
        .send(
            Method::GET,
            &format!("/share/{}/access", b),
            None,
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(access_b.status, StatusCode::UNAUTHORIZED);
    assert_eq!(access_b.body["error"], "Password required");
}

#[tokio::test]
async fn test_public_project_needs_no_credentials() {
    let app = TestApp::new();
    let p = app.seed_project(AuthMode::None, false);

    let access = app
        .send(Method::GET, &format!("/share/{}/access", p), None, &[])
        .await;
    assert_eq!(access.status, StatusCode::OK);
    assert_eq!(access.body["level"], "anonymous");
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let app = TestApp::new();
    let access = app
        .send(
            Method::GET,
            &format!("/share/{}/access", uuid::Uuid::new_v4()),
            None,
            &[],
        )
        .await;
    assert_eq!(access.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_otp_request_is_uniform_and_verify_grants_session() {
    let app = TestApp::new();
    let p = app.seed_project(AuthMode::Otp, false);
    app.repo.add_recipient(p, "client@example.com").unwrap();

    let known = app
        .send(
            Method::POST,
            &format!("/share/{}/otp/request", p),
            Some(json!({ "email": "Client@Example.com" })),
            &[],
        )
        .await;
    let unknown = app
        .send(
            Method::POST,
            &format!("/share/{}/otp/request", p),
            Some(json!({ "email": "stranger@example.com" })),
            &[("x-forwarded-for", "198.51.100.20")],
        )
        .await;
    assert_eq!(known.status, StatusCode::OK);
    assert_eq!(unknown.status, StatusCode::OK);
    assert_eq!(known.body, unknown.body);

    let code = app
        .mail
        .last_otp_code("client@example.com")
        .expect("code mailed");

    let verified = app
        .send(
            Method::POST,
            &format!("/share/{}/otp/verify", p),
            Some(json!({ "email": "client@example.com", "code": code })),
            &[],
        )
        .await;
    assert_eq!(verified.status, StatusCode::OK);
    assert_eq!(verified.body["method"], "OTP");
    assert!(verified.cookie("share_session").is_some());
}

#[tokio::test]
async fn test_otp_lockout_answers_429_with_retry_after() {
    let app = TestApp::new();
    let p = app.seed_project(AuthMode::Otp, false);
    app.repo.add_recipient(p, "client@example.com").unwrap();

    for i in 0..4 {
        let ip = format!("198.51.100.{}", i + 1);
        let attempt = app
            .send(
                Method::POST,
                &format!("/share/{}/otp/verify", p),
                Some(json!({ "email": "client@example.com", "code": "000000" })),
                &[("x-forwarded-for", ip.as_str())],
            )
            .await;
        assert_eq!(attempt.status, StatusCode::UNAUTHORIZED);
    }

    for ip in ["198.51.100.98", "198.51.100.99"] {
        let locked = app
            .send(
                Method::POST,
                &format!("/share/{}/otp/verify", p),
                Some(json!({ "email": "client@example.com", "code": "000000" })),
                &[("x-forwarded-for", ip)],
            )
            .await;
        assert_eq!(locked.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(locked.headers.contains_key("retry-after"));
    }
}

#[tokio::test]
async fn test_guest_session_is_view_only() {
    let app = TestApp::new();
    let p = app.seed_project(AuthMode::Password, true);

    let guest = app
        .send(Method::POST, &format!("/share/{}/guest", p), None, &[])
        .await;
    assert_eq!(guest.status, StatusCode::OK);
    assert_eq!(guest.body["method"], "GUEST");
    let bearer = format!("Bearer {}", guest.str_field("token"));

    let access = app
        .send(
            Method::GET,
            &format!("/share/{}/access", p),
            None,
            &[("authorization", bearer.as_str())],
        )
        .await;
    assert_eq!(access.status, StatusCode::OK);
    assert_eq!(access.body["is_guest"], true);
    assert_eq!(access.body["capabilities"]["view"], true);
    assert_eq!(access.body["capabilities"]["comment"], false);
    assert_eq!(access.body["capabilities"]["download"], false);
}

#[tokio::test]
async fn test_guest_entry_refused_when_disabled() {
    let app = TestApp::new();
    let p = app.seed_project(AuthMode::Password, false);

    let guest = app
        .send(Method::POST, &format!("/share/{}/guest", p), None, &[])
        .await;
    assert_eq!(guest.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_share_logout_clears_cookie_and_session() {
    let app = TestApp::new();
    let p = app.seed_project(AuthMode::Password, false);

    let ok = app
        .send(
            Method::POST,
            &format!("/share/{}/verify-password", p),
            Some(json!({ "password": SHARE_PASSWORD })),
            &[],
        )
        .await;
    let cookie = cookie_header(&ok.cookie("share_session").unwrap());

    let logout = app
        .send(
            Method::POST,
            "/share/logout",
            None,
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(logout.status, StatusCode::OK);
    assert!(logout.set_cookie_header("share_session").is_some());

    let access = app
        .send(
            Method::GET,
            &format!("/share/{}/access", p),
            None,
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(access.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_video_views_are_deduped_and_bots_ignored() {
    let app = TestApp::new();
    let p = app.seed_project(AuthMode::None, false);
    let video = app.seed_video(p, true);
    let uri = format!("/share/{}/videos/{}/view", p, video);

    let first = app.send(Method::POST, &uri, None, &[]).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["recorded"], true);

    let second = app.send(Method::POST, &uri, None, &[]).await;
    assert_eq!(second.body["recorded"], false);

    let bot = app
        .send(
            Method::POST,
            &uri,
            None,
            &[
                ("user-agent", "Googlebot/2.1 (+http://www.google.com/bot.html)"),
                ("x-forwarded-for", "198.51.100.77"),
            ],
        )
        .await;
    assert_eq!(bot.body["recorded"], false);

    let other_project = app.seed_project(AuthMode::None, false);
    let foreign = app
        .send(
            Method::POST,
            &format!("/share/{}/videos/{}/view", other_project, video),
            None,
            &[],
        )
        .await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
}
