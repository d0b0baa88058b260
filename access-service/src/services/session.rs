//! Admin session lifecycle: issue, verify, rotate, revoke.
//!
//! Store layout:
//! - `session_family:{lineage}` -> user id, alive while the lineage may refresh
//! - `user_sessions:{user}` -> set of live lineage ids
//! - `blacklist:{jti}` -> revoked marker, TTL = token's remaining lifetime
//!
//! A lineage has an absolute lifetime fixed at login; rotation never extends it.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::best_effort::best_effort;
use super::token_codec::{AdminClaims, Claims, TokenCodec, TokenPayload, TokenUse};
use super::{SecurityRecorder, ServiceError, SharedStore};
use crate::models::{AdminUser, SecurityEvent, SecurityEventType, Severity};
use crate::utils::constant_time_eq;

pub(crate) fn lineage_key(session_id: &str) -> String {
    format!("session_family:{}", session_id)
}

pub(crate) fn user_sessions_key(user_id: Uuid) -> String {
    format!("user_sessions:{}", user_id)
}

pub(crate) fn blacklist_key(jti: &str) -> String {
    format!("blacklist:{}", jti)
}

#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub session_id: String,
}

/// Verified admin identity, derived once per request.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub user_id: Uuid,
    pub role: String,
    pub session_id: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<String>,
}

impl AdminContext {
    pub fn is_admin(&self) -> bool {
        self.role == crate::models::ROLE_ADMIN
    }
}

/// Request metadata used for binding and auditing.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub fingerprint: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    /// Identity used for rate limiting and analytics when nothing better exists.
    pub fn ip_identity(&self) -> &str {
        self.ip.as_deref().unwrap_or("unknown")
    }
}

#[derive(Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    store: Arc<dyn SharedStore>,
    recorder: SecurityRecorder,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionManager {
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn SharedStore>,
        recorder: SecurityRecorder,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            codec,
            store,
            recorder,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Starts a new lineage for `user` bound to `fingerprint`.
    pub async fn issue_session(
        &self,
        user: &AdminUser,
        fingerprint: &str,
    ) -> Result<SessionTokens, ServiceError> {
        let session_id = Uuid::new_v4().to_string();
        let lineage_ttl = self.refresh_ttl.num_seconds().max(1) as u64;

        self.store
            .set_with_ttl(&lineage_key(&session_id), &user.user_id.to_string(), lineage_ttl)
            .await
            .map_err(ServiceError::Store)?;
        self.store
            .add_to_set_with_ttl(&user_sessions_key(user.user_id), &session_id, lineage_ttl)
            .await
            .map_err(ServiceError::Store)?;

        let tokens = self.mint_pair(
            user.user_id,
            &user.role_code,
            &session_id,
            fingerprint,
            self.refresh_ttl,
        )?;

        tracing::info!(user_id = %user.user_id, "Admin session issued");
        Ok(tokens)
    }

    fn mint_pair(
        &self,
        user_id: Uuid,
        role: &str,
        session_id: &str,
        fingerprint: &str,
        refresh_ttl: Duration,
    ) -> Result<SessionTokens, ServiceError> {
        let claims = |token_use| {
            TokenPayload::Admin(AdminClaims {
                sub: user_id,
                role: role.to_string(),
                session_id: session_id.to_string(),
                fph: fingerprint.to_string(),
                token_use,
                permissions: Vec::new(),
            })
        };

        let access = self.codec.sign(claims(TokenUse::Access), self.access_ttl)?;
        let refresh = self.codec.sign(claims(TokenUse::Refresh), refresh_ttl)?;

        Ok(SessionTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.claims.expires_at(),
            refresh_expires_at: refresh.claims.expires_at(),
            session_id: session_id.to_string(),
        })
    }

    fn decode_admin(&self, token: &str, expected: TokenUse) -> Result<(Claims, AdminClaims), ServiceError> {
        let claims = self.codec.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Admin token rejected by codec");
            ServiceError::auth_required()
        })?;

        match &claims.payload {
            TokenPayload::Admin(admin) if admin.token_use == expected => {
                let admin = admin.clone();
                Ok((claims, admin))
            }
            _ => Err(ServiceError::auth_required()),
        }
    }

    /// Verifies an access token and its revocation state. Any store failure
    /// denies.
    pub async fn verify_access(
        &self,
        token: &str,
        client: &ClientContext,
    ) -> Result<AdminContext, ServiceError> {
        let (claims, admin) = self.decode_admin(token, TokenUse::Access)?;

        let revoked = self
            .store
            .exists(&blacklist_key(&claims.jti))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Blacklist lookup failed; denying");
                ServiceError::Store(e)
            })?;
        if revoked {
            tracing::debug!(jti = claims.short_id(), "Revoked access token presented");
            return Err(ServiceError::auth_required());
        }

        let live = self
            .store
            .exists(&lineage_key(&admin.session_id))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Lineage lookup failed; denying");
                ServiceError::Store(e)
            })?;
        if !live {
            return Err(ServiceError::auth_required());
        }

        if !constant_time_eq(&admin.fph, &client.fingerprint) {
            self.record_device_mismatch(&claims, &admin, client).await;
            return Err(ServiceError::auth_required());
        }

        Ok(AdminContext {
            user_id: admin.sub,
            role: admin.role,
            session_id: admin.session_id,
            token_id: claims.jti.clone(),
            expires_at: claims.expires_at(),
            permissions: admin.permissions,
        })
    }

    /// Rotates a refresh token. The presented token is blacklisted with an
    /// atomic set-if-absent before anything is minted; losing that race means
    /// the token was already used, and the whole lineage is revoked.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientContext,
    ) -> Result<SessionTokens, ServiceError> {
        let (claims, admin) = self.decode_admin(refresh_token, TokenUse::Refresh)?;
        let family = lineage_key(&admin.session_id);

        let lineage_ttl = match self.store.ttl_seconds(&family).await.map_err(ServiceError::Store)? {
            Some(ttl) => ttl,
            None => {
                tracing::info!(jti = claims.short_id(), "Refresh on a revoked lineage");
                return Err(ServiceError::auth_required());
            }
        };

        if !constant_time_eq(&admin.fph, &client.fingerprint) {
            self.record_device_mismatch(&claims, &admin, client).await;
            return Err(ServiceError::auth_required());
        }

        let first_use = self
            .store
            .set_if_absent_with_ttl(
                &blacklist_key(&claims.jti),
                "rotated",
                claims.remaining_seconds(),
            )
            .await
            .map_err(ServiceError::Store)?;

        if !first_use {
            self.revoke_lineage(admin.sub, &admin.session_id).await;

            let mut event =
                SecurityEvent::new(SecurityEventType::RefreshReplayDetected, Severity::Critical)
                    .session(admin.session_id.clone())
                    .detail("user_id", admin.sub.to_string())
                    .detail("jti", claims.short_id())
                    .blocked();
            if let Some(ip) = &client.ip {
                event = event.ip(ip.clone());
            }
            self.recorder.log_event(event).await;

            return Err(ServiceError::auth_required());
        }

        let refresh_ttl = Duration::seconds(lineage_ttl as i64).min(self.refresh_ttl);
        let tokens = self.mint_pair(
            admin.sub,
            &admin.role,
            &admin.session_id,
            &admin.fph,
            refresh_ttl,
        )?;

        tracing::info!(user_id = %admin.sub, "Admin session rotated");
        Ok(tokens)
    }

    /// Best-effort logout. Never fails.
    pub async fn revoke(&self, access_token: Option<&str>, refresh_token: Option<&str>) {
        for token in [access_token, refresh_token].into_iter().flatten() {
            let claims = match self.codec.verify(token) {
                Ok(claims) => claims,
                Err(_) => continue,
            };
            let TokenPayload::Admin(admin) = &claims.payload else {
                continue;
            };

            best_effort(
                "revoke_token",
                self.store.set_with_ttl(
                    &blacklist_key(&claims.jti),
                    "revoked",
                    claims.remaining_seconds(),
                ),
            )
            .await;
            self.revoke_lineage(admin.sub, &admin.session_id).await;
        }
    }

    /// Ends every lineage of `user_id`.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<usize, ServiceError> {
        let index = user_sessions_key(user_id);
        let lineages = self
            .store
            .set_members(&index)
            .await
            .map_err(ServiceError::Store)?;

        for session_id in &lineages {
            self.store
                .delete(&lineage_key(session_id))
                .await
                .map_err(ServiceError::Store)?;
        }
        self.store.delete(&index).await.map_err(ServiceError::Store)?;

        tracing::info!(user_id = %user_id, count = lineages.len(), "Revoked all admin sessions");
        Ok(lineages.len())
    }

    async fn revoke_lineage(&self, user_id: Uuid, session_id: &str) {
        best_effort("revoke_lineage", self.store.delete(&lineage_key(session_id))).await;
        best_effort(
            "revoke_lineage_index",
            self.store
                .remove_from_set(&user_sessions_key(user_id), session_id),
        )
        .await;
    }

    async fn record_device_mismatch(
        &self,
        claims: &Claims,
        admin: &AdminClaims,
        client: &ClientContext,
    ) {
        let mut event = SecurityEvent::new(SecurityEventType::DeviceMismatch, Severity::Warning)
            .session(admin.session_id.clone())
            .detail("user_id", admin.sub.to_string())
            .detail("jti", claims.short_id())
            .blocked();
        if let Some(ip) = &client.ip {
            event = event.ip(ip.clone());
        }
        self.recorder.log_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::services::{MemoryRepository, MemoryStore};
    use secrecy::SecretString;

    struct Harness {
        sessions: SessionManager,
        store: Arc<MemoryStore>,
        repo: Arc<MemoryRepository>,
        user: AdminUser,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let repo = Arc::new(MemoryRepository::new());
        let recorder = SecurityRecorder::new(
            repo.clone(),
            store.clone(),
            AnalyticsConfig {
                page_access_dedupe_minutes: 30,
                video_view_dedupe_minutes: 360,
                download_dedupe_minutes: 60,
            },
        );
        let codec = TokenCodec::new(&SecretString::new(
            "0123456789abcdef0123456789abcdef".to_string(),
        ))
        .unwrap();

        Harness {
            sessions: SessionManager::new(
                codec,
                store.clone(),
                recorder,
                Duration::minutes(15),
                Duration::days(7),
            ),
            store,
            repo,
            user: AdminUser::new("admin@example.com", "hash", "ADMIN"),
        }
    }

    fn device(fingerprint: &str) -> ClientContext {
        ClientContext {
            fingerprint: fingerprint.to_string(),
            ip: Some("203.0.113.1".to_string()),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_issue_then_verify_returns_subject_and_role() {
        let h = harness();
        let tokens = h.sessions.issue_session(&h.user, "fp").await.unwrap();

        let ctx = h
            .sessions
            .verify_access(&tokens.access_token, &device("fp"))
            .await
            .unwrap();
        assert_eq!(ctx.user_id, h.user.user_id);
        assert_eq!(ctx.role, "ADMIN");
        assert!(ctx.is_admin());

        let now = Utc::now();
        assert!((tokens.access_expires_at - now - Duration::minutes(15)).num_seconds().abs() <= 2);
        assert!((tokens.refresh_expires_at - now - Duration::days(7)).num_seconds().abs() <= 2);
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let h = harness();
        let tokens = h.sessions.issue_session(&h.user, "fp").await.unwrap();
        assert!(h
            .sessions
            .verify_access(&tokens.refresh_token, &device("fp"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_revoked_access_token_rejected_before_expiry() {
        let h = harness();
        let tokens = h.sessions.issue_session(&h.user, "fp").await.unwrap();

        h.sessions.revoke(Some(&tokens.access_token), None).await;

        let err = h
            .sessions
            .verify_access(&tokens.access_token, &device("fp"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AuthRequired(_)));
    }

    #[tokio::test]
    async fn test_rotation_rejects_second_use_and_kills_lineage() {
        let h = harness();
        let tokens = h.sessions.issue_session(&h.user, "fp").await.unwrap();

        let rotated = h
            .sessions
            .refresh(&tokens.refresh_token, &device("fp"))
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);
        assert_eq!(rotated.session_id, tokens.session_id);

        let replay = h.sessions.refresh(&tokens.refresh_token, &device("fp")).await;
        assert!(matches!(replay, Err(ServiceError::AuthRequired(_))));

        // The descendant dies with the lineage.
        assert!(h
            .sessions
            .refresh(&rotated.refresh_token, &device("fp"))
            .await
            .is_err());
        assert!(h
            .sessions
            .verify_access(&rotated.access_token, &device("fp"))
            .await
            .is_err());

        let events = h.repo.security_events();
        assert!(events
            .iter()
            .any(|e| e.event_type == SecurityEventType::RefreshReplayDetected
                && e.severity == Severity::Critical));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_has_exactly_one_winner() {
        let h = harness();
        let tokens = h.sessions.issue_session(&h.user, "fp").await.unwrap();

        let a = {
            let sessions = h.sessions.clone();
            let token = tokens.refresh_token.clone();
            tokio::spawn(async move { sessions.refresh(&token, &device("fp")).await })
        };
        let b = {
            let sessions = h.sessions.clone();
            let token = tokens.refresh_token.clone();
            tokio::spawn(async move { sessions.refresh(&token, &device("fp")).await })
        };
        let (a, b) = tokio::join!(a, b);

        let successes = [a.unwrap().is_ok(), b.unwrap().is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_refresh_from_other_device_is_refused_without_consuming() {
        let h = harness();
        let tokens = h.sessions.issue_session(&h.user, "fp").await.unwrap();

        assert!(h
            .sessions
            .refresh(&tokens.refresh_token, &device("stolen"))
            .await
            .is_err());
        assert!(h
            .sessions
            .refresh(&tokens.refresh_token, &device("fp"))
            .await
            .is_ok());
        assert!(h
            .repo
            .security_events()
            .iter()
            .any(|e| e.event_type == SecurityEventType::DeviceMismatch));
    }

    #[tokio::test]
    async fn test_verification_fails_closed_on_store_outage() {
        let h = harness();
        let tokens = h.sessions.issue_session(&h.user, "fp").await.unwrap();

        h.store.set_available(false);
        assert!(matches!(
            h.sessions
                .verify_access(&tokens.access_token, &device("fp"))
                .await,
            Err(ServiceError::Store(_))
        ));
        assert!(h
            .sessions
            .refresh(&tokens.refresh_token, &device("fp"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_logout_survives_store_outage() {
        let h = harness();
        let tokens = h.sessions.issue_session(&h.user, "fp").await.unwrap();

        h.store.set_available(false);
        h.sessions
            .revoke(Some(&tokens.access_token), Some(&tokens.refresh_token))
            .await;
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_ends_every_lineage() {
        let h = harness();
        let laptop = h.sessions.issue_session(&h.user, "fp").await.unwrap();
        let phone = h.sessions.issue_session(&h.user, "fp2").await.unwrap();

        assert_eq!(h.sessions.revoke_all_for_user(h.user.user_id).await.unwrap(), 2);

        assert!(h.sessions.verify_access(&laptop.access_token, &device("fp")).await.is_err());
        assert!(h.sessions.refresh(&phone.refresh_token, &device("fp2")).await.is_err());
    }
}
