pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use chrono::Duration;
use service_core::error::AppError;
use service_core::middleware::{
    client_ip::TrustedProxies,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, FloodGuard},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AccessConfig;
use crate::middleware::{metrics_middleware, DEVICE_ID_HEADER};
use crate::services::{
    AccessRepository, AdminAuthService, ContentTokenService, EmailProvider, OtpVerifier,
    RateLimiter, SecurityRecorder, SessionManager, ShareAccessResolver, SharedStore, TokenCodec,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AccessConfig,
    pub repo: Arc<dyn AccessRepository>,
    pub store: Arc<dyn SharedStore>,
    pub email: Arc<dyn EmailProvider>,
    pub codec: TokenCodec,
    pub sessions: SessionManager,
    pub admin_auth: AdminAuthService,
    pub resolver: ShareAccessResolver,
    pub content: ContentTokenService,
    pub limiter: RateLimiter,
    pub recorder: SecurityRecorder,
    pub trusted_proxies: TrustedProxies,
    pub flood_guard: FloodGuard,
}

impl AppState {
    /// Wires every service from the configuration and the three external
    /// collaborators.
    pub fn new(
        config: AccessConfig,
        repo: Arc<dyn AccessRepository>,
        store: Arc<dyn SharedStore>,
        email: Arc<dyn EmailProvider>,
    ) -> Result<Self, AppError> {
        let codec = TokenCodec::new(&config.jwt.secret).map_err(AppError::ConfigError)?;
        let recorder = SecurityRecorder::new(repo.clone(), store.clone(), config.analytics.clone());
        let limiter = RateLimiter::new(store.clone(), recorder.clone(), config.rate_limit.clone());

        let sessions = SessionManager::new(
            codec.clone(),
            store.clone(),
            recorder.clone(),
            Duration::minutes(config.jwt.access_token_expiry_minutes),
            Duration::days(config.jwt.refresh_token_expiry_days),
        );

        let admin_auth = AdminAuthService::new(
            repo.clone(),
            store.clone(),
            codec.clone(),
            sessions.clone(),
            limiter.clone(),
            recorder.clone(),
            email.clone(),
            Duration::minutes(config.jwt.reset_token_expiry_minutes),
            config.share.public_base_url.clone(),
        );

        let resolver = ShareAccessResolver::new(
            repo.clone(),
            store.clone(),
            codec.clone(),
            sessions.clone(),
            OtpVerifier::new(store.clone(), config.otp.clone()),
            limiter.clone(),
            recorder.clone(),
            email.clone(),
            config.share.clone(),
            Duration::hours(config.jwt.share_token_expiry_hours),
        );

        let content = ContentTokenService::new(
            repo.clone(),
            store.clone(),
            recorder.clone(),
            Duration::minutes(config.content.token_ttl_minutes),
        );

        let trusted_proxies = TrustedProxies::new(config.security.trusted_proxies.clone());
        let flood_guard = FloodGuard::new(
            create_ip_rate_limiter(
                config.security.global_ip_limit,
                config.security.global_ip_window_seconds,
            ),
            trusted_proxies.clone(),
        );

        Ok(Self {
            config,
            repo,
            store,
            email,
            codec,
            sessions,
            admin_auth,
            resolver,
            content,
            limiter,
            recorder,
            trusted_proxies,
            flood_guard,
        })
    }
}

/// Credentialed CORS for the configured origins. A `*` entry (dev only)
/// switches to an uncredentialed wildcard.
fn cors_layer(config: &AccessConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(DEVICE_ID_HEADER),
        ]);

    if config.security.allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    base.allow_origin(origins).allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .route(
            "/auth/password-reset/request",
            post(handlers::request_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::confirm_password_reset),
        );

    let share_routes = Router::new()
        .route("/share/logout", post(handlers::share_logout))
        .route("/share/:project_id/access", get(handlers::access))
        .route(
            "/share/:project_id/verify-password",
            post(handlers::verify_password),
        )
        .route("/share/:project_id/otp/request", post(handlers::request_otp))
        .route("/share/:project_id/otp/verify", post(handlers::verify_otp))
        .route("/share/:project_id/guest", post(handlers::enter_guest))
        .route(
            "/share/:project_id/videos/:video_id/view",
            post(handlers::record_video_view),
        );

    let content_routes = Router::new()
        .route("/content/token", post(handlers::content_token))
        .route("/content/bundle-token", post(handlers::bundle_token));

    let security_routes = Router::new()
        .route(
            "/security/rate-limits",
            get(handlers::list_rate_limits).delete(handlers::clear_rate_limit),
        )
        .route(
            "/security/events",
            get(handlers::list_security_events).delete(handlers::prune_security_events),
        );

    let flood_guard = state.flood_guard.clone();
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .merge(auth_routes)
        .merge(share_routes)
        .merge(content_routes)
        .merge(security_routes)
        .route_layer(from_fn(metrics_middleware))
        .with_state(state)
        // Process-local flood guard in front of every route
        .layer(from_fn_with_state(flood_guard, ip_rate_limit_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}
