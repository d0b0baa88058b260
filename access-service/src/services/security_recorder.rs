//! Audit trail and viewer-dedupe for analytics counters.
//!
//! Nothing here can fail the request that triggered it: writes run through
//! [`best_effort`], and dedupe errors count as "already seen".

use isbot::Bots;
use std::sync::Arc;
use uuid::Uuid;

use super::best_effort::best_effort;
use super::{metrics, AccessRepository, SharedStore};
use crate::config::AnalyticsConfig;
use crate::models::{AnalyticsEvent, AnalyticsKind, SecurityEvent, Severity};

#[derive(Clone)]
pub struct SecurityRecorder {
    repo: Arc<dyn AccessRepository>,
    store: Arc<dyn SharedStore>,
    bots: Arc<Bots>,
    windows: AnalyticsConfig,
}

/// Who is being counted and what they looked at.
#[derive(Debug, Clone)]
pub struct AnalyticsHit<'a> {
    pub kind: AnalyticsKind,
    pub project_id: Uuid,
    pub resource_id: Option<Uuid>,
    pub viewer: &'a str,
    pub method: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

impl SecurityRecorder {
    pub fn new(
        repo: Arc<dyn AccessRepository>,
        store: Arc<dyn SharedStore>,
        windows: AnalyticsConfig,
    ) -> Self {
        Self {
            repo,
            store,
            bots: Arc::new(Bots::default()),
            windows,
        }
    }

    /// Appends `event` to the audit trail. Never fails.
    pub async fn log_event(&self, event: SecurityEvent) {
        match event.severity {
            Severity::Critical => tracing::error!(
                event_type = event.event_type.as_str(),
                project_id = ?event.project_id,
                ip = ?event.ip_address,
                "Security event"
            ),
            Severity::Warning => tracing::warn!(
                event_type = event.event_type.as_str(),
                project_id = ?event.project_id,
                ip = ?event.ip_address,
                "Security event"
            ),
            Severity::Info => tracing::info!(
                event_type = event.event_type.as_str(),
                project_id = ?event.project_id,
                "Security event"
            ),
        }
        metrics::record_security_event(event.event_type.as_str());

        best_effort("security_event", self.repo.insert_security_event(&event)).await;
    }

    /// Atomic check-and-set. Returns `true` when `key` was already flagged
    /// inside its window, or when the store could not answer.
    pub async fn dedupe_once(&self, key: &str, ttl_seconds: u64) -> bool {
        let flag = format!("dedupe:{}", key);
        match best_effort(
            "analytics_dedupe",
            self.store.set_if_absent_with_ttl(&flag, "1", ttl_seconds),
        )
        .await
        {
            Some(created) => !created,
            None => true,
        }
    }

    fn window_seconds(&self, kind: AnalyticsKind) -> u64 {
        let minutes = match kind {
            AnalyticsKind::SharePageAccess => self.windows.page_access_dedupe_minutes,
            AnalyticsKind::VideoView => self.windows.video_view_dedupe_minutes,
            AnalyticsKind::Download => self.windows.download_dedupe_minutes,
        };
        (minutes.max(1) * 60) as u64
    }

    pub fn is_bot(&self, user_agent: Option<&str>) -> bool {
        user_agent.map_or(false, |ua| self.bots.is_bot(ua))
    }

    /// Records one analytics row unless the viewer is a bot or was already
    /// counted in the window. Returns whether a row was written.
    pub async fn record_analytics(&self, hit: AnalyticsHit<'_>) -> bool {
        if self.is_bot(hit.user_agent) {
            tracing::debug!(kind = hit.kind.as_str(), "Skipping analytics for bot");
            return false;
        }

        let key = format!(
            "{}:{}:{}:{}",
            hit.kind.as_str(),
            hit.project_id,
            hit.resource_id
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            hit.viewer
        );
        if self.dedupe_once(&key, self.window_seconds(hit.kind)).await {
            return false;
        }

        let mut event = AnalyticsEvent::new(hit.kind, hit.project_id, hit.resource_id, hit.viewer);
        event.method = hit.method.map(str::to_string);

        best_effort("analytics_event", self.repo.insert_analytics_event(&event))
            .await
            .is_some()
    }
}
