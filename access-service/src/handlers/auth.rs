//! Admin session endpoints: login, refresh rotation, logout and password
//! reset.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use service_core::error::AppError;

use super::cookies::{admin_refresh_cookie, admin_refresh_removal, ADMIN_REFRESH_COOKIE};
use crate::dtos::auth::{
    LoginRequest, LogoutRequest, PasswordResetConfirm, PasswordResetRequest, RefreshRequest,
    TokenPairResponse,
};
use crate::dtos::MessageResponse;
use crate::middleware::Credentials;
use crate::services::{ServiceError, SessionTokens};
use crate::utils::{Password, ValidatedJson};
use crate::AppState;

fn with_refresh_cookie(state: &AppState, jar: CookieJar, tokens: &SessionTokens) -> CookieJar {
    let max_age = (tokens.refresh_expires_at - Utc::now()).num_seconds();
    jar.add(admin_refresh_cookie(
        tokens.refresh_token.clone(),
        max_age,
        state.config.share.cookie_secure,
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Credentials(creds): Credentials,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password = Password::new(req.password);
    let tokens = state
        .admin_auth
        .login(req.email.trim(), &password, &creds.client)
        .await?;

    let jar = with_refresh_cookie(&state, jar, &tokens);
    Ok((StatusCode::OK, jar, Json(TokenPairResponse::from(tokens))))
}

/// POST /auth/refresh
///
/// The refresh token may come from the body, the `Authorization` header or the
/// refresh cookie, in that order.
pub async fn refresh(
    State(state): State<AppState>,
    Credentials(creds): Credentials,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let token = body
        .and_then(|Json(req)| req.refresh_token)
        .or_else(|| creds.bearer.clone())
        .or_else(|| jar.get(ADMIN_REFRESH_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or_else(ServiceError::auth_required)?;

    let tokens = state.admin_auth.refresh(&token, &creds.client).await?;

    let jar = with_refresh_cookie(&state, jar, &tokens);
    Ok((StatusCode::OK, jar, Json(TokenPairResponse::from(tokens))))
}

/// POST /auth/logout
///
/// Always 200. Revocation is best-effort and the refresh cookie is cleared
/// regardless.
pub async fn logout(
    State(state): State<AppState>,
    Credentials(creds): Credentials,
    jar: CookieJar,
    body: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let refresh_token = body
        .and_then(|Json(req)| req.refresh_token)
        .or_else(|| jar.get(ADMIN_REFRESH_COOKIE).map(|c| c.value().to_string()));

    state
        .admin_auth
        .logout(
            creds.bearer.as_deref(),
            refresh_token.as_deref(),
            &creds.client,
        )
        .await;

    (
        StatusCode::OK,
        jar.remove(admin_refresh_removal()),
        Json(MessageResponse::new("Logged out successfully")),
    )
}

/// POST /auth/password-reset/request
pub async fn request_password_reset(
    State(state): State<AppState>,
    Credentials(creds): Credentials,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .admin_auth
        .request_password_reset(req.email.trim(), &creds.client)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(
            "If the account exists, a password reset link has been sent",
        )),
    ))
}

/// POST /auth/password-reset/confirm
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Credentials(creds): Credentials,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    let new_password = Password::new(req.new_password);
    state
        .admin_auth
        .confirm_password_reset(&req.token, &new_password, &creds.client)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password has been reset")),
    ))
}
