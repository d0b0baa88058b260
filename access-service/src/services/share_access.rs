//! Decides whether a request may view a project, and establishes share
//! sessions through password, OTP or guest entry.
//!
//! Strategies are tried in order: admin session, public project, share
//! session scoped to the project. Store layout:
//! - `share_session:{sid}` -> JSON [`ShareSession`]
//! - `share_session:{sid}:projects` -> set of `{project}` / `guest:{project}`
//! - `share_session:{sid}:unlock:{member}` -> JSON [`ProjectUnlock`], one per
//!   set member; access to a project is decided by this record

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::best_effort::best_effort;
use super::error::GENERIC_AUTH_FAILURE;
use super::otp::{OtpOutcome, OtpVerifier};
use super::security_recorder::AnalyticsHit;
use super::session::{ClientContext, SessionManager};
use super::token_codec::{GuestClaims, ShareClaims, TokenCodec, TokenPayload};
use super::{
    AccessRepository, EmailProvider, RateLimiter, SecurityRecorder, ServiceError, SharedStore,
};
use crate::config::ShareConfig;
use crate::models::{
    AnalyticsKind, AuthMethod, ProjectAccess, RateLimitAction, SecurityEvent, SecurityEventType,
    ProjectUnlock, Severity, ShareSession,
};
use crate::utils::{random_hex, verify_against_dummy, verify_password, Password};

pub const SHARE_SESSION_COOKIE: &str = "share_session";

fn session_key(session_id: &str) -> String {
    format!("share_session:{}", session_id)
}

fn projects_key(session_id: &str) -> String {
    format!("share_session:{}:projects", session_id)
}

fn unlock_key(session_id: &str, member: &str) -> String {
    format!("share_session:{}:unlock:{}", session_id, member)
}

fn encode<T: Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))
}

fn full_member(project_id: Uuid) -> String {
    project_id.to_string()
}

fn guest_member(project_id: Uuid) -> String {
    format!("guest:{}", project_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Admin,
    Anonymous,
    Share,
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub view: bool,
    pub comment: bool,
    pub approve: bool,
    pub download: bool,
}

/// Normalized authorization decision for one project, derived once per
/// request and passed explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub project_id: Uuid,
    pub level: AccessLevel,
    pub session_id: Option<String>,
    pub method: Option<AuthMethod>,
    pub email: Option<String>,
}

impl AccessContext {
    pub fn is_admin(&self) -> bool {
        self.level == AccessLevel::Admin
    }

    pub fn is_guest(&self) -> bool {
        self.level == AccessLevel::Guest
    }

    pub fn capabilities(&self) -> Capabilities {
        match self.level {
            AccessLevel::Admin | AccessLevel::Share | AccessLevel::Anonymous => Capabilities {
                view: true,
                comment: true,
                approve: true,
                download: true,
            },
            AccessLevel::Guest => Capabilities {
                view: true,
                comment: false,
                approve: false,
                download: false,
            },
        }
    }

    /// Session identifier carried into content grants.
    pub fn session_label(&self) -> String {
        match (&self.level, &self.session_id) {
            (_, Some(sid)) => sid.clone(),
            (AccessLevel::Admin, None) => "admin".to_string(),
            _ => "anonymous".to_string(),
        }
    }
}

/// Credentials lifted from one request.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    pub bearer: Option<String>,
    pub share_session: Option<String>,
    pub client: ClientContext,
}

/// Result of a successful password, OTP or guest entry.
#[derive(Debug, Clone)]
pub struct ShareGrant {
    pub project_id: Uuid,
    pub session_id: String,
    pub method: AuthMethod,
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
    pub session_ttl_seconds: u64,
}

#[derive(Clone)]
pub struct ShareAccessResolver {
    repo: Arc<dyn AccessRepository>,
    store: Arc<dyn SharedStore>,
    codec: TokenCodec,
    sessions: SessionManager,
    otp: OtpVerifier,
    limiter: RateLimiter,
    recorder: SecurityRecorder,
    email: Arc<dyn EmailProvider>,
    config: ShareConfig,
    share_token_ttl: Duration,
}

impl ShareAccessResolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn AccessRepository>,
        store: Arc<dyn SharedStore>,
        codec: TokenCodec,
        sessions: SessionManager,
        otp: OtpVerifier,
        limiter: RateLimiter,
        recorder: SecurityRecorder,
        email: Arc<dyn EmailProvider>,
        config: ShareConfig,
        share_token_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            store,
            codec,
            sessions,
            otp,
            limiter,
            recorder,
            email,
            config,
            share_token_ttl,
        }
    }

    pub fn session_ttl_seconds(&self) -> u64 {
        (self.config.client_session_timeout_hours.max(1) * 3600) as u64
    }

    async fn load_project(&self, project_id: Uuid) -> Result<ProjectAccess, ServiceError> {
        self.repo
            .find_project_access(project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))
    }

    /// Answers "may this request view project P?".
    pub async fn resolve(
        &self,
        project_id: Uuid,
        creds: &RequestCredentials,
    ) -> Result<AccessContext, ServiceError> {
        if let Some(bearer) = creds.bearer.as_deref() {
            match self.sessions.verify_access(bearer, &creds.client).await {
                Ok(admin) => {
                    return Ok(AccessContext {
                        project_id,
                        level: AccessLevel::Admin,
                        session_id: Some(admin.session_id),
                        method: None,
                        email: None,
                    })
                }
                Err(ServiceError::AuthRequired(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let project = self.load_project(project_id).await?;

        if project.is_public() {
            return Ok(AccessContext {
                project_id,
                level: AccessLevel::Anonymous,
                session_id: None,
                method: None,
                email: None,
            });
        }

        if project.is_closed() {
            return Err(ServiceError::Forbidden("This project is closed".to_string()));
        }

        for session_id in self.candidate_sessions(project_id, creds) {
            if let Some(ctx) = self.session_access(&project, &session_id).await? {
                return Ok(ctx);
            }
        }

        Err(ServiceError::AuthRequired("Password required".to_string()))
    }

    /// Session ids presented by cookie or by a share/guest bearer token for
    /// this project.
    fn candidate_sessions(&self, project_id: Uuid, creds: &RequestCredentials) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(sid) = creds.share_session.as_deref().filter(|s| !s.is_empty()) {
            candidates.push(sid.to_string());
        }

        if let Some(claims) = creds
            .bearer
            .as_deref()
            .and_then(|token| self.codec.verify(token).ok())
        {
            match claims.payload {
                TokenPayload::Share(ShareClaims {
                    project_id: pid,
                    session_id,
                    ..
                })
                | TokenPayload::Guest(GuestClaims {
                    project_id: pid,
                    session_id,
                }) if pid == project_id => {
                    if !candidates.contains(&session_id) {
                        candidates.push(session_id);
                    }
                }
                _ => {}
            }
        }

        candidates
    }

    async fn session_access(
        &self,
        project: &ProjectAccess,
        session_id: &str,
    ) -> Result<Option<AccessContext>, ServiceError> {
        let (level, unlock) = match self
            .load_unlock(session_id, &full_member(project.project_id))
            .await?
        {
            Some(unlock) => (AccessLevel::Share, unlock),
            None if project.guest_mode => {
                match self
                    .load_unlock(session_id, &guest_member(project.project_id))
                    .await?
                {
                    Some(unlock) => (AccessLevel::Guest, unlock),
                    None => return Ok(None),
                }
            }
            None => return Ok(None),
        };

        if unlock.project_id != project.project_id {
            return Ok(None);
        }

        Ok(Some(AccessContext {
            project_id: project.project_id,
            level,
            session_id: Some(session_id.to_string()),
            method: Some(unlock.method),
            email: unlock.email,
        }))
    }

    /// Reads one project's unlock record. Store errors deny; an unreadable
    /// record counts as absent.
    async fn load_unlock(
        &self,
        session_id: &str,
        member: &str,
    ) -> Result<Option<ProjectUnlock>, ServiceError> {
        let raw = self
            .store
            .get(&unlock_key(session_id, member))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Share session lookup failed; denying");
                ServiceError::Store(e)
            })?;

        Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(unlock) => Some(unlock),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable share unlock record");
                None
            }
        }))
    }

    /// Records a deduped page visit for non-admin viewers.
    pub async fn record_page_access(&self, ctx: &AccessContext, client: &ClientContext) {
        if ctx.is_admin() {
            return;
        }
        let viewer = ctx
            .email
            .clone()
            .unwrap_or_else(|| client.ip_identity().to_string());
        self.recorder
            .record_analytics(AnalyticsHit {
                kind: AnalyticsKind::SharePageAccess,
                project_id: ctx.project_id,
                resource_id: None,
                viewer: &viewer,
                method: ctx.method.map(|m| m.as_str()),
                user_agent: client.user_agent.as_deref(),
            })
            .await;
    }

    pub async fn verify_password(
        &self,
        project_id: Uuid,
        password: &Password,
        email: Option<&str>,
        creds: &RequestCredentials,
    ) -> Result<ShareGrant, ServiceError> {
        let ip = creds.client.ip_identity();
        self.limiter
            .ensure_allowed(RateLimitAction::SharePassword, ip)
            .await?;

        let project = self.load_project(project_id).await?;
        if project.is_closed() {
            return Err(ServiceError::Forbidden("This project is closed".to_string()));
        }
        if !project.auth_mode.allows_password() {
            return Err(ServiceError::Validation(
                "Password access is not enabled for this project".to_string(),
            ));
        }

        let verified = match project.password_hash.as_deref() {
            Some(hash) => verify_password(password, hash),
            None => {
                verify_against_dummy(password);
                false
            }
        };

        if !verified {
            self.limiter.hit(RateLimitAction::SharePassword, ip).await;
            self.recorder
                .log_event(
                    SecurityEvent::new(SecurityEventType::SharePasswordFailed, Severity::Warning)
                        .project(project_id)
                        .ip(ip),
                )
                .await;
            return Err(ServiceError::generic_credentials());
        }

        let grant = self
            .establish(&project, AuthMethod::Password, email, creds)
            .await?;

        self.recorder
            .log_event(
                SecurityEvent::new(SecurityEventType::SharePasswordSuccess, Severity::Info)
                    .project(project_id)
                    .session(grant.session_id.clone())
                    .ip(ip),
            )
            .await;

        Ok(grant)
    }

    /// Always succeeds from the caller's point of view so recipients cannot be
    /// enumerated. Recipients get a code by email.
    pub async fn request_otp(
        &self,
        project_id: Uuid,
        email: &str,
        creds: &RequestCredentials,
    ) -> Result<(), ServiceError> {
        let ip = creds.client.ip_identity();
        self.limiter
            .enforce(RateLimitAction::ShareOtpRequest, ip)
            .await?;

        let project = self.load_project(project_id).await?;
        if project.is_closed() {
            return Err(ServiceError::Forbidden("This project is closed".to_string()));
        }
        if !project.auth_mode.allows_otp() {
            return Err(ServiceError::Validation(
                "Code access is not enabled for this project".to_string(),
            ));
        }

        if !self.repo.is_project_recipient(project_id, email).await? {
            tracing::info!(project_id = %project_id, "OTP requested for non-recipient");
            return Ok(());
        }

        if let Some(code) = self.otp.issue(project_id, email).await? {
            best_effort(
                "otp_email",
                self.email
                    .send_otp_code(email, &project.title, &code, self.otp.expiry_minutes()),
            )
            .await;
        }

        Ok(())
    }

    pub async fn verify_otp(
        &self,
        project_id: Uuid,
        email: &str,
        code: &str,
        creds: &RequestCredentials,
    ) -> Result<ShareGrant, ServiceError> {
        let ip = creds.client.ip_identity();
        self.limiter
            .ensure_allowed(RateLimitAction::ShareOtpVerify, ip)
            .await?;

        let project = self.load_project(project_id).await?;
        if project.is_closed() {
            return Err(ServiceError::Forbidden("This project is closed".to_string()));
        }
        if !project.auth_mode.allows_otp() {
            return Err(ServiceError::Validation(
                "Code access is not enabled for this project".to_string(),
            ));
        }

        let is_recipient = self.repo.is_project_recipient(project_id, email).await?;

        match self.otp.verify(project_id, email, code, is_recipient).await? {
            OtpOutcome::Verified => {
                let grant = self
                    .establish(&project, AuthMethod::Otp, Some(email), creds)
                    .await?;
                self.recorder
                    .log_event(
                        SecurityEvent::new(SecurityEventType::ShareOtpSuccess, Severity::Info)
                            .project(project_id)
                            .session(grant.session_id.clone())
                            .ip(ip),
                    )
                    .await;
                Ok(grant)
            }
            OtpOutcome::Rejected => {
                self.limiter.hit(RateLimitAction::ShareOtpVerify, ip).await;
                self.recorder
                    .log_event(
                        SecurityEvent::new(SecurityEventType::ShareOtpFailed, Severity::Warning)
                            .project(project_id)
                            .ip(ip),
                    )
                    .await;
                Err(ServiceError::AuthRequired(GENERIC_AUTH_FAILURE.to_string()))
            }
            OtpOutcome::LockedOut {
                retry_after_seconds,
            } => {
                self.recorder
                    .log_event(
                        SecurityEvent::new(SecurityEventType::ShareOtpLockout, Severity::Warning)
                            .project(project_id)
                            .ip(ip)
                            .blocked(),
                    )
                    .await;
                Err(ServiceError::RateLimited {
                    retry_after_seconds,
                })
            }
        }
    }

    pub async fn enter_guest(
        &self,
        project_id: Uuid,
        creds: &RequestCredentials,
    ) -> Result<ShareGrant, ServiceError> {
        let ip = creds.client.ip_identity();
        self.limiter.enforce(RateLimitAction::ShareGuest, ip).await?;

        let project = self.load_project(project_id).await?;
        if project.is_closed() {
            return Err(ServiceError::Forbidden("This project is closed".to_string()));
        }
        if !project.guest_mode {
            return Err(ServiceError::Forbidden(
                "Guest access is not enabled for this project".to_string(),
            ));
        }

        let grant = self.establish(&project, AuthMethod::Guest, None, creds).await?;

        self.recorder
            .log_event(
                SecurityEvent::new(SecurityEventType::GuestAccess, Severity::Info)
                    .project(project_id)
                    .session(grant.session_id.clone())
                    .ip(ip),
            )
            .await;

        Ok(grant)
    }

    /// Writes (or extends) the share session, scopes it to `project`, and
    /// signs the matching bearer token.
    async fn establish(
        &self,
        project: &ProjectAccess,
        method: AuthMethod,
        email: Option<&str>,
        creds: &RequestCredentials,
    ) -> Result<ShareGrant, ServiceError> {
        let ttl = self.session_ttl_seconds();

        let existing: Option<ShareSession> =
            match creds.share_session.as_deref().filter(|s| !s.is_empty()) {
                Some(sid) => self
                    .store
                    .get(&session_key(sid))
                    .await
                    .map_err(ServiceError::Store)?
                    .and_then(|raw| serde_json::from_str(&raw).ok()),
                None => None,
            };
        let session = existing.unwrap_or_else(|| ShareSession {
            session_id: random_hex(32),
            created_at: Utc::now(),
        });
        let session_id = session.session_id.clone();

        let unlock = ProjectUnlock {
            project_id: project.project_id,
            method,
            email: email.map(|e| e.trim().to_lowercase()),
            unlocked_at: Utc::now(),
        };
        let member = match method {
            AuthMethod::Guest => guest_member(project.project_id),
            AuthMethod::Password | AuthMethod::Otp => full_member(project.project_id),
        };

        self.store
            .set_with_ttl(&session_key(&session_id), &encode(&session)?, ttl)
            .await
            .map_err(ServiceError::Store)?;
        self.store
            .set_with_ttl(&unlock_key(&session_id, &member), &encode(&unlock)?, ttl)
            .await
            .map_err(ServiceError::Store)?;
        self.store
            .add_to_set_with_ttl(&projects_key(&session_id), &member, ttl)
            .await
            .map_err(ServiceError::Store)?;

        let token_payload = match method {
            AuthMethod::Guest => TokenPayload::Guest(GuestClaims {
                project_id: project.project_id,
                session_id: session_id.clone(),
            }),
            AuthMethod::Password | AuthMethod::Otp => TokenPayload::Share(ShareClaims {
                project_id: project.project_id,
                session_id: session_id.clone(),
                method,
            }),
        };
        let signed = self.codec.sign(token_payload, self.share_token_ttl)?;

        let viewer = unlock
            .email
            .clone()
            .unwrap_or_else(|| creds.client.ip_identity().to_string());
        self.recorder
            .record_analytics(AnalyticsHit {
                kind: AnalyticsKind::SharePageAccess,
                project_id: project.project_id,
                resource_id: None,
                viewer: &viewer,
                method: Some(method.as_str()),
                user_agent: creds.client.user_agent.as_deref(),
            })
            .await;

        Ok(ShareGrant {
            project_id: project.project_id,
            session_id,
            method,
            token: signed.token,
            token_expires_at: signed.claims.expires_at(),
            session_ttl_seconds: ttl,
        })
    }

    /// Drops a share session. Best-effort; TTL bounds it otherwise.
    pub async fn logout(&self, session_id: &str) {
        let members = best_effort(
            "share_logout_members",
            self.store.set_members(&projects_key(session_id)),
        )
        .await
        .unwrap_or_default();
        for member in &members {
            best_effort(
                "share_logout_unlock",
                self.store.delete(&unlock_key(session_id, member)),
            )
            .await;
        }
        best_effort("share_logout", self.store.delete(&session_key(session_id))).await;
        best_effort(
            "share_logout_projects",
            self.store.delete(&projects_key(session_id)),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::{AdminUser, AuthMode, ProjectStatus, ROLE_ADMIN};
    use crate::services::{MemoryRepository, MemoryStore, MockEmailService};
    use crate::utils::hash_password;
    use crate::AppState;

    const PASSWORD: &str = "secret123";

    struct Harness {
        state: AppState,
        repo: Arc<MemoryRepository>,
        store: Arc<MemoryStore>,
        mail: Arc<MockEmailService>,
    }

    fn harness() -> Harness {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryStore::new());
        let mail = Arc::new(MockEmailService::new());
        let state = AppState::new(test_config(), repo.clone(), store.clone(), mail.clone())
            .expect("state");
        Harness {
            state,
            repo,
            store,
            mail,
        }
    }

    fn project(h: &Harness, auth_mode: AuthMode, guest_mode: bool, status: ProjectStatus) -> Uuid {
        let password_hash = match auth_mode {
            AuthMode::Password | AuthMode::Both => {
                Some(hash_password(&Password::new(PASSWORD.to_string())).unwrap())
            }
            _ => None,
        };
        let project_id = Uuid::new_v4();
        h.repo
            .insert_project(ProjectAccess {
                project_id,
                title: "Launch cut".to_string(),
                auth_mode,
                password_hash,
                guest_mode,
                status,
            })
            .unwrap();
        project_id
    }

    fn anonymous() -> RequestCredentials {
        RequestCredentials {
            client: ClientContext {
                fingerprint: "fp-1".to_string(),
                ip: Some("203.0.113.10".to_string()),
                user_agent: None,
            },
            ..Default::default()
        }
    }

    fn with_cookie(session_id: &str) -> RequestCredentials {
        RequestCredentials {
            share_session: Some(session_id.to_string()),
            ..anonymous()
        }
    }

    fn pw(value: &str) -> Password {
        Password::new(value.to_string())
    }

    #[tokio::test]
    async fn test_unlocking_one_project_does_not_unlock_another() {
        let h = harness();
        let a = project(&h, AuthMode::Password, false, ProjectStatus::InReview);
        let b = project(&h, AuthMode::Password, false, ProjectStatus::InReview);

        let grant = h
            .state
            .resolver
            .verify_password(a, &pw(PASSWORD), None, &anonymous())
            .await
            .unwrap();

        let creds = with_cookie(&grant.session_id);
        let ctx = h.state.resolver.resolve(a, &creds).await.unwrap();
        assert_eq!(ctx.level, AccessLevel::Share);
        assert_eq!(ctx.method, Some(AuthMethod::Password));

        assert!(matches!(
            h.state.resolver.resolve(b, &creds).await,
            Err(ServiceError::AuthRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_second_unlock_reuses_the_cookie_session() {
        let h = harness();
        let a = project(&h, AuthMode::Password, false, ProjectStatus::InReview);
        let b = project(&h, AuthMode::Password, false, ProjectStatus::InReview);

        let first = h
            .state
            .resolver
            .verify_password(a, &pw(PASSWORD), None, &anonymous())
            .await
            .unwrap();
        let creds = with_cookie(&first.session_id);
        let second = h
            .state
            .resolver
            .verify_password(b, &pw(PASSWORD), None, &creds)
            .await
            .unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert!(h.state.resolver.resolve(a, &creds).await.is_ok());
        assert!(h.state.resolver.resolve(b, &creds).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_password_is_generic_and_audited() {
        let h = harness();
        let a = project(&h, AuthMode::Password, false, ProjectStatus::InReview);

        match h
            .state
            .resolver
            .verify_password(a, &pw("wrong"), Some("someone@example.com"), &anonymous())
            .await
        {
            Err(ServiceError::AuthRequired(msg)) => assert_eq!(msg, GENERIC_AUTH_FAILURE),
            other => panic!("unexpected: {:?}", other.map(|g| g.session_id)),
        }

        assert!(h
            .repo
            .security_events()
            .iter()
            .any(|e| e.event_type == SecurityEventType::SharePasswordFailed));
    }

    #[tokio::test]
    async fn test_public_and_closed_projects() {
        let h = harness();
        let public = project(&h, AuthMode::None, false, ProjectStatus::InReview);
        let closed = project(&h, AuthMode::Password, false, ProjectStatus::Closed);

        let ctx = h.state.resolver.resolve(public, &anonymous()).await.unwrap();
        assert_eq!(ctx.level, AccessLevel::Anonymous);

        assert!(matches!(
            h.state.resolver.resolve(closed, &anonymous()).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            h.state.resolver.resolve(Uuid::new_v4(), &anonymous()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_bearer_wins_even_on_closed_project() {
        let h = harness();
        let closed = project(&h, AuthMode::Password, false, ProjectStatus::Closed);
        let admin = AdminUser::new("ops@example.com", "unused", ROLE_ADMIN);
        let tokens = h.state.sessions.issue_session(&admin, "fp-1").await.unwrap();

        let creds = RequestCredentials {
            bearer: Some(tokens.access_token),
            ..anonymous()
        };
        let ctx = h.state.resolver.resolve(closed, &creds).await.unwrap();
        assert!(ctx.is_admin());
    }

    #[tokio::test]
    async fn test_guest_entry_is_view_only_and_requires_guest_mode() {
        let h = harness();
        let open = project(&h, AuthMode::Password, true, ProjectStatus::InReview);
        let shut = project(&h, AuthMode::Password, false, ProjectStatus::InReview);

        let grant = h.state.resolver.enter_guest(open, &anonymous()).await.unwrap();
        assert_eq!(grant.method, AuthMethod::Guest);

        let ctx = h
            .state
            .resolver
            .resolve(open, &with_cookie(&grant.session_id))
            .await
            .unwrap();
        assert!(ctx.is_guest());
        let caps = ctx.capabilities();
        assert!(caps.view);
        assert!(!caps.comment && !caps.approve && !caps.download);

        assert!(matches!(
            h.state.resolver.enter_guest(shut, &anonymous()).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_share_bearer_only_works_for_its_project() {
        let h = harness();
        let a = project(&h, AuthMode::Password, false, ProjectStatus::InReview);
        let b = project(&h, AuthMode::Password, false, ProjectStatus::InReview);
        let grant = h
            .state
            .resolver
            .verify_password(a, &pw(PASSWORD), None, &anonymous())
            .await
            .unwrap();

        let creds = RequestCredentials {
            bearer: Some(grant.token),
            ..anonymous()
        };
        assert!(h.state.resolver.resolve(a, &creds).await.is_ok());
        assert!(h.state.resolver.resolve(b, &creds).await.is_err());
    }

    #[tokio::test]
    async fn test_otp_flow_for_recipient() {
        let h = harness();
        let p = project(&h, AuthMode::Otp, false, ProjectStatus::InReview);
        h.repo.add_recipient(p, "client@example.com").unwrap();

        h.state
            .resolver
            .request_otp(p, "client@example.com", &anonymous())
            .await
            .unwrap();
        let code = h.mail.last_otp_code("client@example.com").expect("code mailed");

        let grant = h
            .state
            .resolver
            .verify_otp(p, "client@example.com", &code, &anonymous())
            .await
            .unwrap();
        let ctx = h
            .state
            .resolver
            .resolve(p, &with_cookie(&grant.session_id))
            .await
            .unwrap();
        assert_eq!(ctx.method, Some(AuthMethod::Otp));
        assert_eq!(ctx.email.as_deref(), Some("client@example.com"));

        // single use
        assert!(h
            .state
            .resolver
            .verify_otp(p, "client@example.com", &code, &anonymous())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_each_project_keeps_its_own_unlock_method() {
        let h = harness();
        let a = project(&h, AuthMode::Otp, false, ProjectStatus::InReview);
        let b = project(&h, AuthMode::Password, true, ProjectStatus::InReview);
        h.repo.add_recipient(a, "alice@example.com").unwrap();

        h.state
            .resolver
            .request_otp(a, "alice@example.com", &anonymous())
            .await
            .unwrap();
        let code = h.mail.last_otp_code("alice@example.com").expect("code mailed");
        let first = h
            .state
            .resolver
            .verify_otp(a, "alice@example.com", &code, &anonymous())
            .await
            .unwrap();

        let creds = with_cookie(&first.session_id);
        h.state
            .resolver
            .verify_password(b, &pw(PASSWORD), None, &creds)
            .await
            .unwrap();
        h.state.resolver.enter_guest(b, &creds).await.unwrap();

        let on_a = h.state.resolver.resolve(a, &creds).await.unwrap();
        assert_eq!(on_a.method, Some(AuthMethod::Otp));
        assert_eq!(on_a.email.as_deref(), Some("alice@example.com"));

        let on_b = h.state.resolver.resolve(b, &creds).await.unwrap();
        assert_eq!(on_b.level, AccessLevel::Share);
        assert_eq!(on_b.method, Some(AuthMethod::Password));
        assert_eq!(on_b.email, None);
    }

    #[tokio::test]
    async fn test_otp_request_for_stranger_looks_identical() {
        let h = harness();
        let p = project(&h, AuthMode::Otp, false, ProjectStatus::InReview);

        assert!(h
            .state
            .resolver
            .request_otp(p, "stranger@example.com", &anonymous())
            .await
            .is_ok());
        assert!(h.mail.sent().is_empty());

        match h
            .state
            .resolver
            .verify_otp(p, "stranger@example.com", "123456", &anonymous())
            .await
        {
            Err(ServiceError::AuthRequired(msg)) => assert_eq!(msg, GENERIC_AUTH_FAILURE),
            other => panic!("unexpected: {:?}", other.map(|g| g.session_id)),
        }
    }

    #[tokio::test]
    async fn test_session_lookup_fails_closed_when_store_is_down() {
        let h = harness();
        let a = project(&h, AuthMode::Password, false, ProjectStatus::InReview);
        let grant = h
            .state
            .resolver
            .verify_password(a, &pw(PASSWORD), None, &anonymous())
            .await
            .unwrap();

        h.store.set_available(false);
        assert!(matches!(
            h.state
                .resolver
                .resolve(a, &with_cookie(&grant.session_id))
                .await,
            Err(ServiceError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_drops_the_session() {
        let h = harness();
        let a = project(&h, AuthMode::Password, false, ProjectStatus::InReview);
        let grant = h
            .state
            .resolver
            .verify_password(a, &pw(PASSWORD), None, &anonymous())
            .await
            .unwrap();

        h.state.resolver.logout(&grant.session_id).await;
        assert!(h
            .state
            .resolver
            .resolve(a, &with_cookie(&grant.session_id))
            .await
            .is_err());
    }
}
