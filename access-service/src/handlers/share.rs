//! Share link endpoints. The project id in the path scopes every decision.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use uuid::Uuid;

use super::cookies::{share_session_cookie, share_session_removal};
use crate::dtos::share::{
    AccessResponse, OtpRequest, OtpVerifyRequest, ShareGrantResponse, VerifyPasswordRequest,
    ViewRecordedResponse,
};
use crate::dtos::MessageResponse;
use crate::middleware::Credentials;
use crate::models::{AnalyticsKind, ResourceKind};
use crate::services::security_recorder::AnalyticsHit;
use crate::services::{ServiceError, ShareGrant};
use crate::utils::{Password, ValidatedJson};
use crate::AppState;

fn granted(state: &AppState, jar: CookieJar, grant: &ShareGrant) -> impl IntoResponse {
    let jar = jar.add(share_session_cookie(
        grant.session_id.clone(),
        grant.session_ttl_seconds,
        state.config.share.cookie_secure,
    ));
    (StatusCode::OK, jar, Json(ShareGrantResponse::from(grant)))
}

/// GET /share/:project_id/access
pub async fn access(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Credentials(creds): Credentials,
) -> Result<impl IntoResponse, AppError> {
    let ctx = state.resolver.resolve(project_id, &creds).await?;
    state.resolver.record_page_access(&ctx, &creds.client).await;
    Ok(Json(AccessResponse::from(&ctx)))
}

/// POST /share/:project_id/verify-password
pub async fn verify_password(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Credentials(creds): Credentials,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<VerifyPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password = Password::new(req.password);
    let grant = state
        .resolver
        .verify_password(project_id, &password, req.email.as_deref(), &creds)
        .await?;
    Ok(granted(&state, jar, &grant))
}

/// POST /share/:project_id/otp/request
pub async fn request_otp(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Credentials(creds): Credentials,
    ValidatedJson(req): ValidatedJson<OtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim().to_lowercase();
    state.resolver.request_otp(project_id, &email, &creds).await?;
    Ok(Json(MessageResponse::new(
        "If this email has access, a code has been sent",
    )))
}

/// POST /share/:project_id/otp/verify
pub async fn verify_otp(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Credentials(creds): Credentials,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<OtpVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim().to_lowercase();
    let grant = state
        .resolver
        .verify_otp(project_id, &email, req.code.trim(), &creds)
        .await?;
    Ok(granted(&state, jar, &grant))
}

/// POST /share/:project_id/guest
pub async fn enter_guest(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Credentials(creds): Credentials,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let grant = state.resolver.enter_guest(project_id, &creds).await?;
    Ok(granted(&state, jar, &grant))
}

/// POST /share/:project_id/videos/:video_id/view
///
/// Counts a view once per viewer per window. Admin previews and bots are not
/// counted.
pub async fn record_video_view(
    State(state): State<AppState>,
    Path((project_id, video_id)): Path<(Uuid, Uuid)>,
    Credentials(creds): Credentials,
) -> Result<impl IntoResponse, AppError> {
    let ctx = state.resolver.resolve(project_id, &creds).await?;

    let video = state
        .repo
        .find_resource(video_id)
        .await?
        .filter(|r| r.project_id == project_id && r.kind == ResourceKind::Video)
        .ok_or_else(|| ServiceError::NotFound("Video not found".to_string()))?;

    if ctx.is_admin() {
        return Ok(Json(ViewRecordedResponse { recorded: false }));
    }

    let viewer = ctx
        .email
        .clone()
        .or_else(|| ctx.session_id.clone())
        .unwrap_or_else(|| creds.client.ip_identity().to_string());

    let recorded = state
        .recorder
        .record_analytics(AnalyticsHit {
            kind: AnalyticsKind::VideoView,
            project_id,
            resource_id: Some(video.resource_id),
            viewer: &viewer,
            method: ctx.method.map(|m| m.as_str()),
            user_agent: creds.client.user_agent.as_deref(),
        })
        .await;

    Ok(Json(ViewRecordedResponse { recorded }))
}

/// POST /share/logout
pub async fn share_logout(
    State(state): State<AppState>,
    Credentials(creds): Credentials,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(session_id) = creds.share_session.as_deref() {
        state.resolver.logout(session_id).await;
    }
    (
        StatusCode::OK,
        jar.remove(share_session_removal()),
        Json(MessageResponse::new("Logged out successfully")),
    )
}
