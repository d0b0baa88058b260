//! In-process [`AccessRepository`] for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::{AccessRepository, ServiceError};
use crate::models::{
    AdminUser, AnalyticsEvent, ProjectAccess, ResourceMeta, SecurityEvent, SecurityEventQuery,
};

#[derive(Default)]
struct Tables {
    admins: HashMap<Uuid, AdminUser>,
    projects: HashMap<Uuid, ProjectAccess>,
    recipients: HashSet<(Uuid, String)>,
    resources: HashMap<Uuid, ResourceMeta>,
    security_events: Vec<SecurityEvent>,
    analytics_events: Vec<AnalyticsEvent>,
}

pub struct MemoryRepository {
    tables: Mutex<Tables>,
    available: AtomicBool,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T, ServiceError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "memory repository unavailable"
            )));
        }
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("repository lock poisoned")))?;
        Ok(f(&mut tables))
    }

    pub fn insert_admin(&self, admin: AdminUser) -> Result<(), ServiceError> {
        self.with_tables(|t| {
            t.admins.insert(admin.user_id, admin);
        })
    }

    pub fn insert_project(&self, project: ProjectAccess) -> Result<(), ServiceError> {
        self.with_tables(|t| {
            t.projects.insert(project.project_id, project);
        })
    }

    pub fn add_recipient(&self, project_id: Uuid, email: &str) -> Result<(), ServiceError> {
        self.with_tables(|t| {
            t.recipients.insert((project_id, email.to_lowercase()));
        })
    }

    pub fn insert_resource(&self, resource: ResourceMeta) -> Result<(), ServiceError> {
        self.with_tables(|t| {
            t.resources.insert(resource.resource_id, resource);
        })
    }

    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.with_tables(|t| t.security_events.clone())
            .unwrap_or_default()
    }

    pub fn analytics_events(&self) -> Vec<AnalyticsEvent> {
        self.with_tables(|t| t.analytics_events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccessRepository for MemoryRepository {
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminUser>, ServiceError> {
        self.with_tables(|t| {
            t.admins
                .values()
                .find(|a| a.email.eq_ignore_ascii_case(email))
                .cloned()
        })
    }

    async fn find_admin_by_id(&self, user_id: Uuid) -> Result<Option<AdminUser>, ServiceError> {
        self.with_tables(|t| t.admins.get(&user_id).cloned())
    }

    async fn update_admin_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        self.with_tables(|t| {
            if let Some(admin) = t.admins.get_mut(&user_id) {
                admin.password_hash = password_hash.to_string();
            }
        })
    }

    async fn find_project_access(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectAccess>, ServiceError> {
        self.with_tables(|t| t.projects.get(&project_id).cloned())
    }

    async fn is_project_recipient(
        &self,
        project_id: Uuid,
        email: &str,
    ) -> Result<bool, ServiceError> {
        self.with_tables(|t| t.recipients.contains(&(project_id, email.to_lowercase())))
    }

    async fn find_resource(&self, resource_id: Uuid) -> Result<Option<ResourceMeta>, ServiceError> {
        self.with_tables(|t| t.resources.get(&resource_id).cloned())
    }

    async fn insert_security_event(&self, event: &SecurityEvent) -> Result<(), ServiceError> {
        self.with_tables(|t| t.security_events.push(event.clone()))
    }

    async fn list_security_events(
        &self,
        query: &SecurityEventQuery,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        self.with_tables(|t| {
            let mut events: Vec<SecurityEvent> = t
                .security_events
                .iter()
                .filter(|e| query.event_type.map_or(true, |ty| e.event_type == ty))
                .filter(|e| query.project_id.map_or(true, |p| e.project_id == Some(p)))
                .cloned()
                .collect();
            events.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
            events.truncate(query.limit.max(0) as usize);
            events
        })
    }

    async fn delete_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        self.with_tables(|t| {
            let before = t.security_events.len();
            t.security_events.retain(|e| e.created_utc >= cutoff);
            (before - t.security_events.len()) as u64
        })
    }

    async fn insert_analytics_event(&self, event: &AnalyticsEvent) -> Result<(), ServiceError> {
        self.with_tables(|t| t.analytics_events.push(event.clone()))
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.with_tables(|_| ())
    }
}
