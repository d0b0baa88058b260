//! Analytics rows counted at most once per viewer per window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsKind {
    SharePageAccess,
    VideoView,
    Download,
}

impl AnalyticsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsKind::SharePageAccess => "share_page_access",
            AnalyticsKind::VideoView => "video_view",
            AnalyticsKind::Download => "download",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: Uuid,
    pub kind: AnalyticsKind,
    pub project_id: Uuid,
    pub resource_id: Option<Uuid>,
    /// Share session id, admin user id, or client IP, whichever is known.
    pub viewer: String,
    pub method: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(
        kind: AnalyticsKind,
        project_id: Uuid,
        resource_id: Option<Uuid>,
        viewer: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            project_id,
            resource_id,
            viewer: viewer.into(),
            method: None,
            created_utc: Utc::now(),
        }
    }
}
