//! Rate limiting vocabulary: actions, per-action policy, and decisions.

use serde::{Deserialize, Serialize};

/// Endpoints that mint or consume credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    AdminLogin,
    AdminRefresh,
    PasswordReset,
    SharePassword,
    ShareOtpRequest,
    ShareOtpVerify,
    ShareGuest,
    ContentToken,
}

impl RateLimitAction {
    pub const ALL: [RateLimitAction; 8] = [
        RateLimitAction::AdminLogin,
        RateLimitAction::AdminRefresh,
        RateLimitAction::PasswordReset,
        RateLimitAction::SharePassword,
        RateLimitAction::ShareOtpRequest,
        RateLimitAction::ShareOtpVerify,
        RateLimitAction::ShareGuest,
        RateLimitAction::ContentToken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::AdminLogin => "admin_login",
            RateLimitAction::AdminRefresh => "admin_refresh",
            RateLimitAction::PasswordReset => "password_reset",
            RateLimitAction::SharePassword => "share_password",
            RateLimitAction::ShareOtpRequest => "share_otp_request",
            RateLimitAction::ShareOtpVerify => "share_otp_verify",
            RateLimitAction::ShareGuest => "share_guest",
            RateLimitAction::ContentToken => "content_token",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == code)
    }

    /// Defaults used when the environment does not override them.
    pub fn default_policy(&self) -> RateLimitPolicy {
        match self {
            RateLimitAction::AdminLogin => RateLimitPolicy::new(5, 900),
            RateLimitAction::AdminRefresh => RateLimitPolicy::new(30, 60),
            RateLimitAction::PasswordReset => RateLimitPolicy::new(3, 3600),
            RateLimitAction::SharePassword => RateLimitPolicy::new(5, 900),
            RateLimitAction::ShareOtpRequest => RateLimitPolicy::new(3, 900),
            RateLimitAction::ShareOtpVerify => RateLimitPolicy::new(10, 900),
            RateLimitAction::ShareGuest => RateLimitPolicy::new(20, 60),
            RateLimitAction::ContentToken => RateLimitPolicy::new(120, 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u64,
    pub window_seconds: u64,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u64, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub limited: bool,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl RateLimitDecision {
    pub fn allowed(count: u64) -> Self {
        Self {
            limited: false,
            count,
            retry_after_seconds: None,
        }
    }
}

/// A counter currently over its limit, as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitedKey {
    pub key: String,
    pub action: RateLimitAction,
    pub identity: String,
    pub count: u64,
    pub limit: u64,
    pub retry_after_seconds: u64,
}
