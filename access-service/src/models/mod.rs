//! Domain models for the access layer.
//!
//! Persistent rows (admin users, projects, resources, security events,
//! analytics) and the JSON payloads kept in the shared store (share sessions,
//! content grants).

mod admin_user;
mod analytics;
mod content_grant;
mod project;
mod rate_limit;
mod security_event;
mod share_session;

pub use admin_user::{AdminUser, ROLE_ADMIN};
pub use analytics::{AnalyticsEvent, AnalyticsKind};
pub use content_grant::{ContentGrant, ContentQuality, ContentScope};
pub use project::{AuthMode, ProjectAccess, ProjectStatus, ResourceKind, ResourceMeta};
pub use rate_limit::{LimitedKey, RateLimitAction, RateLimitDecision, RateLimitPolicy};
pub use security_event::{SecurityEvent, SecurityEventQuery, SecurityEventType, Severity};
pub use share_session::{AuthMethod, ProjectUnlock, ShareSession};
