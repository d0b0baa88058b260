//! Security event model - append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    AdminLoginSuccess,
    AdminLoginFailed,
    AdminLogout,
    RefreshReplayDetected,
    DeviceMismatch,
    PasswordResetRequested,
    PasswordResetCompleted,
    SharePasswordSuccess,
    SharePasswordFailed,
    ShareOtpSuccess,
    ShareOtpFailed,
    ShareOtpLockout,
    GuestAccess,
    RateLimitExceeded,
    ContentAccessDenied,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::AdminLoginSuccess => "admin_login_success",
            SecurityEventType::AdminLoginFailed => "admin_login_failed",
            SecurityEventType::AdminLogout => "admin_logout",
            SecurityEventType::RefreshReplayDetected => "refresh_replay_detected",
            SecurityEventType::DeviceMismatch => "device_mismatch",
            SecurityEventType::PasswordResetRequested => "password_reset_requested",
            SecurityEventType::PasswordResetCompleted => "password_reset_completed",
            SecurityEventType::SharePasswordSuccess => "share_password_success",
            SecurityEventType::SharePasswordFailed => "share_password_failed",
            SecurityEventType::ShareOtpSuccess => "share_otp_success",
            SecurityEventType::ShareOtpFailed => "share_otp_failed",
            SecurityEventType::ShareOtpLockout => "share_otp_lockout",
            SecurityEventType::GuestAccess => "guest_access",
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::ContentAccessDenied => "content_access_denied",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(code.to_string())).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_id: Uuid,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub project_id: Option<Uuid>,
    pub video_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: serde_json::Value,
    pub blocked: bool,
    pub created_utc: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: Severity) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            severity,
            project_id: None,
            video_id: None,
            session_id: None,
            ip_address: None,
            details: serde_json::Value::Object(serde_json::Map::new()),
            blocked: false,
            created_utc: Utc::now(),
        }
    }

    pub fn project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn video(mut self, video_id: Uuid) -> Self {
        self.video_id = Some(video_id);
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(map) = &mut self.details {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn blocked(mut self) -> Self {
        self.blocked = true;
        self
    }
}

/// Filter for the operator listing.
#[derive(Debug, Clone, Default)]
pub struct SecurityEventQuery {
    pub event_type: Option<SecurityEventType>,
    pub project_id: Option<Uuid>,
    pub limit: i64,
}
