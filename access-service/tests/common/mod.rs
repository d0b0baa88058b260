//! Shared harness: the full router over in-memory collaborators.

#![allow(dead_code)]

use access_service::{
    build_router,
    config::{
        AccessConfig, AnalyticsConfig, ContentConfig, DatabaseConfig, Environment, JwtConfig,
        OtpConfig, RateLimitConfig, RedisConfig, SecurityConfig, ShareConfig, SmtpConfig,
    },
    models::{AdminUser, AuthMode, ProjectAccess, ProjectStatus, ResourceKind, ResourceMeta, ROLE_ADMIN},
    services::{MemoryRepository, MemoryStore, MockEmailService},
    utils::{hash_password, Password},
    AppState,
};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "ops@example.com";
pub const ADMIN_PASSWORD: &str = "correct-horse-battery";
pub const SHARE_PASSWORD: &str = "secret123";
/// Load balancer every test request arrives through.
pub const EDGE_PROXY: &str = "10.0.0.2";
pub const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn test_config() -> AccessConfig {
    AccessConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "access-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/access_test".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        jwt: JwtConfig {
            secret: SecretString::new("integration-secret-0123456789abcdef".to_string()),
            fingerprint_secret: None,
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            share_token_expiry_hours: 24,
            reset_token_expiry_minutes: 30,
        },
        share: ShareConfig {
            client_session_timeout_hours: 24,
            cookie_secure: true,
            public_base_url: "https://review.example.com".to_string(),
        },
        otp: OtpConfig {
            code_length: 6,
            expiry_minutes: 10,
            max_attempts: 5,
            lockout_minutes: 15,
        },
        content: ContentConfig {
            token_ttl_minutes: 10,
        },
        analytics: AnalyticsConfig {
            page_access_dedupe_minutes: 30,
            video_view_dedupe_minutes: 360,
            download_dedupe_minutes: 60,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: SecretString::new(String::new()),
            from_address: "no-reply@example.com".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["https://review.example.com".to_string()],
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
            trusted_proxies: vec![EDGE_PROXY.parse().unwrap()],
        },
        rate_limit: RateLimitConfig::default(),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Value of the named cookie from `Set-Cookie`, if any.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|raw| {
                let pair = raw.split(';').next()?;
                let (key, value) = pair.split_once('=')?;
                (key.trim() == name).then(|| value.trim().to_string())
            })
    }

    pub fn set_cookie_header(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|raw| raw.starts_with(&format!("{}=", name)))
            .map(str::to_string)
    }

    pub fn str_field(&self, field: &str) -> String {
        self.body[field].as_str().unwrap_or_default().to_string()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
    pub store: Arc<MemoryStore>,
    pub mail: Arc<MockEmailService>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AccessConfig) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryStore::new());
        let mail = Arc::new(MockEmailService::new());
        let state = AppState::new(config, repo.clone(), store.clone(), mail.clone())
            .expect("Failed to build state");

        Self {
            router: build_router(state.clone()),
            state,
            repo,
            store,
            mail,
        }
    }

    pub fn seed_admin(&self) -> AdminUser {
        let hash = hash_password(&Password::new(ADMIN_PASSWORD.to_string())).unwrap();
        let admin = AdminUser::new(ADMIN_EMAIL, hash, ROLE_ADMIN);
        self.repo.insert_admin(admin.clone()).unwrap();
        admin
    }

    pub fn seed_project(&self, auth_mode: AuthMode, guest_mode: bool) -> Uuid {
        let password_hash = match auth_mode {
            AuthMode::Password | AuthMode::Both => {
                Some(hash_password(&Password::new(SHARE_PASSWORD.to_string())).unwrap())
            }
            _ => None,
        };
        let project_id = Uuid::new_v4();
        self.repo
            .insert_project(ProjectAccess {
                project_id,
                title: "Spring campaign".to_string(),
                auth_mode,
                password_hash,
                guest_mode,
                status: ProjectStatus::InReview,
            })
            .unwrap();
        project_id
    }

    pub fn seed_video(&self, project_id: Uuid, approved: bool) -> Uuid {
        let resource_id = Uuid::new_v4();
        self.repo
            .insert_resource(ResourceMeta {
                resource_id,
                project_id,
                kind: ResourceKind::Video,
                approved,
            })
            .unwrap();
        resource_id
    }

    /// Sends one request through the edge proxy. `headers` are extra
    /// `(name, value)` pairs; every request carries a browser User-Agent and a
    /// forwarded client IP unless overridden.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);

        let has = |name: &str| headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name));
        if !has("user-agent") {
            builder = builder.header(header::USER_AGENT, BROWSER_UA);
        }
        if !has("x-forwarded-for") {
            builder = builder.header("x-forwarded-for", "203.0.113.50");
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let mut request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        let edge: IpAddr = EDGE_PROXY.parse().unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(edge, 443)));

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn login(&self) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/login",
            Some(serde_json::json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            &[],
        )
        .await
    }
}
