//! HTTP handlers. Each one derives the request's credentials once and hands
//! them to the services explicitly.

pub mod auth;
pub mod content;
pub mod cookies;
pub mod health;
pub mod security;
pub mod share;

pub use auth::{confirm_password_reset, login, logout, refresh, request_password_reset};
pub use content::{bundle_token, content_token};
pub use health::{health_check, metrics};
pub use security::{clear_rate_limit, list_rate_limits, list_security_events, prune_security_events};
pub use share::{
    access, enter_guest, record_video_view, request_otp, share_logout, verify_otp,
    verify_password,
};
