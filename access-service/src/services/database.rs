//! Persistent store: admin accounts, project access configuration, resource
//! metadata, and the audit/analytics tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use super::ServiceError;
use crate::models::{
    AdminUser, AnalyticsEvent, AuthMode, ProjectAccess, ProjectStatus, ResourceKind,
    ResourceMeta, SecurityEvent, SecurityEventQuery, SecurityEventType, Severity,
};

#[async_trait]
pub trait AccessRepository: Send + Sync {
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminUser>, ServiceError>;

    async fn find_admin_by_id(&self, user_id: Uuid) -> Result<Option<AdminUser>, ServiceError>;

    async fn update_admin_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError>;

    async fn find_project_access(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectAccess>, ServiceError>;

    async fn is_project_recipient(&self, project_id: Uuid, email: &str)
        -> Result<bool, ServiceError>;

    async fn find_resource(&self, resource_id: Uuid) -> Result<Option<ResourceMeta>, ServiceError>;

    async fn insert_security_event(&self, event: &SecurityEvent) -> Result<(), ServiceError>;

    async fn list_security_events(
        &self,
        query: &SecurityEventQuery,
    ) -> Result<Vec<SecurityEvent>, ServiceError>;

    /// Returns the number of rows removed.
    async fn delete_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;

    async fn insert_analytics_event(&self, event: &AnalyticsEvent) -> Result<(), ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(FromRow)]
struct ProjectRow {
    project_id: Uuid,
    title: String,
    auth_mode_code: String,
    password_hash: Option<String>,
    guest_mode: bool,
    status_code: String,
}

impl TryFrom<ProjectRow> for ProjectAccess {
    type Error = ServiceError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let auth_mode = AuthMode::from_code(&row.auth_mode_code).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "unknown auth mode {} on project {}",
                row.auth_mode_code,
                row.project_id
            ))
        })?;
        let status = ProjectStatus::from_code(&row.status_code).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "unknown status {} on project {}",
                row.status_code,
                row.project_id
            ))
        })?;

        Ok(ProjectAccess {
            project_id: row.project_id,
            title: row.title,
            auth_mode,
            password_hash: row.password_hash,
            guest_mode: row.guest_mode,
            status,
        })
    }
}

#[derive(FromRow)]
struct ResourceRow {
    resource_id: Uuid,
    project_id: Uuid,
    kind_code: String,
    approved: bool,
}

impl TryFrom<ResourceRow> for ResourceMeta {
    type Error = ServiceError;

    fn try_from(row: ResourceRow) -> Result<Self, Self::Error> {
        let kind = ResourceKind::from_code(&row.kind_code).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "unknown resource kind {} on {}",
                row.kind_code,
                row.resource_id
            ))
        })?;

        Ok(ResourceMeta {
            resource_id: row.resource_id,
            project_id: row.project_id,
            kind,
            approved: row.approved,
        })
    }
}

#[derive(FromRow)]
struct SecurityEventRow {
    event_id: Uuid,
    event_type_code: String,
    severity_code: String,
    project_id: Option<Uuid>,
    video_id: Option<Uuid>,
    session_id: Option<String>,
    ip_address: Option<String>,
    details: String,
    blocked: bool,
    created_utc: DateTime<Utc>,
}

impl TryFrom<SecurityEventRow> for SecurityEvent {
    type Error = ServiceError;

    fn try_from(row: SecurityEventRow) -> Result<Self, Self::Error> {
        let event_type = SecurityEventType::from_code(&row.event_type_code).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "unknown security event type {}",
                row.event_type_code
            ))
        })?;

        Ok(SecurityEvent {
            event_id: row.event_id,
            event_type,
            severity: Severity::from_code(&row.severity_code).unwrap_or(Severity::Info),
            project_id: row.project_id,
            video_id: row.video_id,
            session_id: row.session_id,
            ip_address: row.ip_address,
            details: serde_json::from_str(&row.details)
                .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new())),
            blocked: row.blocked,
            created_utc: row.created_utc,
        })
    }
}

/// PostgreSQL-backed repository.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccessRepository for Database {
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminUser>, ServiceError> {
        let user = sqlx::query_as::<_, AdminUser>(
            "SELECT * FROM admin_users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_admin_by_id(&self, user_id: Uuid) -> Result<Option<AdminUser>, ServiceError> {
        let user = sqlx::query_as::<_, AdminUser>("SELECT * FROM admin_users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_admin_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE admin_users SET password_hash = $1 WHERE user_id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_project_access(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectAccess>, ServiceError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT project_id, title, auth_mode_code, password_hash, guest_mode, status_code
            FROM projects
            WHERE project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProjectAccess::try_from).transpose()
    }

    async fn is_project_recipient(
        &self,
        project_id: Uuid,
        email: &str,
    ) -> Result<bool, ServiceError> {
        let found: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM project_recipients WHERE project_id = $1 AND LOWER(email) = LOWER($2)",
        )
        .bind(project_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn find_resource(&self, resource_id: Uuid) -> Result<Option<ResourceMeta>, ServiceError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            "SELECT resource_id, project_id, kind_code, approved FROM resources WHERE resource_id = $1",
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ResourceMeta::try_from).transpose()
    }

    async fn insert_security_event(&self, event: &SecurityEvent) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO security_events
                (event_id, event_type_code, severity_code, project_id, video_id,
                 session_id, ip_address, details, blocked, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.event_id)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(event.project_id)
        .bind(event.video_id)
        .bind(&event.session_id)
        .bind(&event.ip_address)
        .bind(event.details.to_string())
        .bind(event.blocked)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_security_events(
        &self,
        query: &SecurityEventQuery,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        let rows = sqlx::query_as::<_, SecurityEventRow>(
            r#"
            SELECT event_id, event_type_code, severity_code, project_id, video_id,
                   session_id, ip_address, details, blocked, created_utc
            FROM security_events
            WHERE ($1::TEXT IS NULL OR event_type_code = $1)
              AND ($2::UUID IS NULL OR project_id = $2)
            ORDER BY created_utc DESC
            LIMIT $3
            "#,
        )
        .bind(query.event_type.map(|t| t.as_str()))
        .bind(query.project_id)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SecurityEvent::try_from).collect()
    }

    async fn delete_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM security_events WHERE created_utc < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_analytics_event(&self, event: &AnalyticsEvent) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO analytics_events
                (event_id, kind_code, project_id, resource_id, viewer, method_code, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.event_id)
        .bind(event.kind.as_str())
        .bind(event.project_id)
        .bind(event.resource_id)
        .bind(&event.viewer)
        .bind(&event.method)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(e)
            })?;
        Ok(())
    }
}
