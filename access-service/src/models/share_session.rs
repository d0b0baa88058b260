//! Share session - maps the opaque share cookie to the projects it unlocked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMethod {
    Password,
    Otp,
    Guest,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "PASSWORD",
            AuthMethod::Otp => "OTP",
            AuthMethod::Guest => "GUEST",
        }
    }
}

/// Session record stored under `share_session:{session_id}`. Its presence is
/// what lets a later unlock reuse the cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// How one project was unlocked within a share session. Each project keeps
/// its own record so later unlocks never rewrite an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUnlock {
    pub project_id: Uuid,
    pub method: AuthMethod,
    pub email: Option<String>,
    pub unlocked_at: DateTime<Utc>,
}
