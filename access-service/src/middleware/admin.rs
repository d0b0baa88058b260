use axum::{extract::FromRequestParts, http::request::Parts};
use service_core::error::AppError;

use super::credentials::request_credentials;
use crate::services::{AdminContext, ServiceError};
use crate::AppState;

/// Verified admin session. Rejects with 401 when no valid admin access token
/// is presented and 403 when the role is not admin.
pub struct AdminSession(pub AdminContext);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let creds = request_credentials(parts, state);

        let token = creds.bearer.as_deref().ok_or_else(ServiceError::auth_required)?;
        let admin = state.sessions.verify_access(token, &creds.client).await?;

        if !admin.is_admin() {
            tracing::warn!(user_id = %admin.user_id, "Non-admin token on admin route");
            return Err(ServiceError::Forbidden("Admin access required".to_string()).into());
        }

        Ok(AdminSession(admin))
    }
}
