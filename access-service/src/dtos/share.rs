use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::AuthMethod;
use crate::services::{AccessContext, AccessLevel, Capabilities, ShareGrant};

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPasswordRequest {
    #[validate(length(min = 1, max = 256, message = "Password is required"))]
    pub password: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OtpVerifyRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 4, max = 10, message = "Invalid code"))]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub authorized: bool,
    pub project_id: Uuid,
    pub is_admin: bool,
    pub is_guest: bool,
    pub level: AccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<AuthMethod>,
    pub capabilities: Capabilities,
}

impl From<&AccessContext> for AccessResponse {
    fn from(ctx: &AccessContext) -> Self {
        Self {
            authorized: true,
            project_id: ctx.project_id,
            is_admin: ctx.is_admin(),
            is_guest: ctx.is_guest(),
            level: ctx.level,
            method: ctx.method,
            capabilities: ctx.capabilities(),
        }
    }
}

/// Returned by every share entry point. The session itself travels in the
/// cookie; `token` is the bearer form for clients that cannot keep cookies.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShareGrantResponse {
    pub project_id: Uuid,
    pub method: AuthMethod,
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
    pub session_expires_in: u64,
}

impl From<&ShareGrant> for ShareGrantResponse {
    fn from(grant: &ShareGrant) -> Self {
        Self {
            project_id: grant.project_id,
            method: grant.method,
            token: grant.token.clone(),
            token_expires_at: grant.token_expires_at,
            session_expires_in: grant.session_ttl_seconds,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewRecordedResponse {
    pub recorded: bool,
}
