use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::dtos::content::{BundleTokenRequest, ContentTokenRequest, ContentTokenResponse};
use crate::middleware::Credentials;
use crate::models::RateLimitAction;
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /content/token
///
/// Mints a short-lived token for one resource at one quality. The caller must
/// already have access to the resource's project.
pub async fn content_token(
    State(state): State<AppState>,
    Credentials(creds): Credentials,
    ValidatedJson(req): ValidatedJson<ContentTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .limiter
        .enforce(RateLimitAction::ContentToken, creds.client.ip_identity())
        .await?;

    let ctx = state.resolver.resolve(req.project_id, &creds).await?;
    let minted = state
        .content
        .mint(&ctx, req.resource_id, req.quality)
        .await?;

    Ok((StatusCode::OK, Json(ContentTokenResponse::from(minted))))
}

/// POST /content/bundle-token
pub async fn bundle_token(
    State(state): State<AppState>,
    Credentials(creds): Credentials,
    ValidatedJson(req): ValidatedJson<BundleTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .limiter
        .enforce(RateLimitAction::ContentToken, creds.client.ip_identity())
        .await?;

    let ctx = state.resolver.resolve(req.project_id, &creds).await?;
    let minted = state.content.mint_bundle(&ctx, &req.resource_ids).await?;

    Ok((StatusCode::OK, Json(ContentTokenResponse::from(minted))))
}
