//! Admin login, logout and password reset on top of [`SessionManager`].

use chrono::Duration;
use std::sync::Arc;

use super::best_effort::best_effort;
use super::session::{ClientContext, SessionManager, SessionTokens};
use super::token_codec::{TokenCodec, TokenPayload};
use super::{
    AccessRepository, EmailProvider, RateLimiter, SecurityRecorder, ServiceError, SharedStore,
};
use crate::models::{RateLimitAction, SecurityEvent, SecurityEventType, Severity};
use crate::utils::{hash_password, verify_against_dummy, verify_password, Password};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

#[derive(Clone)]
pub struct AdminAuthService {
    repo: Arc<dyn AccessRepository>,
    store: Arc<dyn SharedStore>,
    codec: TokenCodec,
    sessions: SessionManager,
    limiter: RateLimiter,
    recorder: SecurityRecorder,
    email: Arc<dyn EmailProvider>,
    reset_ttl: Duration,
    public_base_url: String,
}

impl AdminAuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn AccessRepository>,
        store: Arc<dyn SharedStore>,
        codec: TokenCodec,
        sessions: SessionManager,
        limiter: RateLimiter,
        recorder: SecurityRecorder,
        email: Arc<dyn EmailProvider>,
        reset_ttl: Duration,
        public_base_url: String,
    ) -> Self {
        Self {
            repo,
            store,
            codec,
            sessions,
            limiter,
            recorder,
            email,
            reset_ttl,
            public_base_url,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Only failed attempts count against the login limit.
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        client: &ClientContext,
    ) -> Result<SessionTokens, ServiceError> {
        let ip = client.ip_identity();
        self.limiter
            .ensure_allowed(RateLimitAction::AdminLogin, ip)
            .await?;

        let admin = self.repo.find_admin_by_email(email).await?;
        let verified = match &admin {
            Some(user) => verify_password(password, &user.password_hash) && user.is_admin(),
            None => {
                verify_against_dummy(password);
                false
            }
        };

        let user = match admin {
            Some(user) if verified => user,
            _ => {
                self.limiter.hit(RateLimitAction::AdminLogin, ip).await;
                self.recorder
                    .log_event(
                        SecurityEvent::new(SecurityEventType::AdminLoginFailed, Severity::Warning)
                            .ip(ip),
                    )
                    .await;
                return Err(ServiceError::AuthRequired(INVALID_CREDENTIALS.to_string()));
            }
        };

        let tokens = self.sessions.issue_session(&user, &client.fingerprint).await?;

        self.recorder
            .log_event(
                SecurityEvent::new(SecurityEventType::AdminLoginSuccess, Severity::Info)
                    .session(tokens.session_id.clone())
                    .ip(ip)
                    .detail("user_id", user.user_id.to_string()),
            )
            .await;

        Ok(tokens)
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientContext,
    ) -> Result<SessionTokens, ServiceError> {
        self.limiter
            .enforce(RateLimitAction::AdminRefresh, client.ip_identity())
            .await?;
        self.sessions.refresh(refresh_token, client).await
    }

    /// Best-effort; never fails.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        client: &ClientContext,
    ) {
        self.sessions.revoke(access_token, refresh_token).await;

        let mut event = SecurityEvent::new(SecurityEventType::AdminLogout, Severity::Info);
        if let Some(ip) = &client.ip {
            event = event.ip(ip.clone());
        }
        self.recorder.log_event(event).await;
    }

    /// Answers the same way whether or not `email` belongs to an admin.
    pub async fn request_password_reset(
        &self,
        email: &str,
        client: &ClientContext,
    ) -> Result<(), ServiceError> {
        let ip = client.ip_identity();
        self.limiter
            .enforce(RateLimitAction::PasswordReset, ip)
            .await?;

        let admin = match self.repo.find_admin_by_email(email).await? {
            Some(admin) if admin.is_admin() => admin,
            _ => {
                tracing::info!("Password reset requested for unknown account");
                return Ok(());
            }
        };

        let signed = self.codec.sign(
            TokenPayload::ResetPassword {
                sub: admin.user_id,
                email: admin.email.clone(),
            },
            self.reset_ttl,
        )?;

        best_effort(
            "password_reset_email",
            self.email
                .send_password_reset_email(&admin.email, &signed.token, &self.public_base_url),
        )
        .await;

        self.recorder
            .log_event(
                SecurityEvent::new(SecurityEventType::PasswordResetRequested, Severity::Info)
                    .ip(ip)
                    .detail("user_id", admin.user_id.to_string()),
            )
            .await;

        Ok(())
    }

    /// Consumes a reset token once, stores the new hash, and ends every
    /// session of the account. All token failures share one message.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &Password,
        client: &ClientContext,
    ) -> Result<(), ServiceError> {
        let invalid = || ServiceError::Validation(INVALID_RESET_TOKEN.to_string());

        let claims = self.codec.verify(token).map_err(|_| invalid())?;
        let TokenPayload::ResetPassword { sub, email } = &claims.payload else {
            return Err(invalid());
        };

        let admin = match self.repo.find_admin_by_id(*sub).await? {
            Some(admin) if admin.is_admin() && admin.email.eq_ignore_ascii_case(email) => admin,
            _ => return Err(invalid()),
        };

        let first_use = self
            .store
            .set_if_absent_with_ttl(
                &format!("reset_used:{}", claims.jti),
                "1",
                claims.remaining_seconds(),
            )
            .await
            .map_err(ServiceError::Store)?;
        if !first_use {
            return Err(invalid());
        }

        let hash = hash_password(new_password)?;
        self.repo.update_admin_password(admin.user_id, &hash).await?;
        self.sessions.revoke_all_for_user(admin.user_id).await?;

        let mut event =
            SecurityEvent::new(SecurityEventType::PasswordResetCompleted, Severity::Info)
                .detail("user_id", admin.user_id.to_string());
        if let Some(ip) = &client.ip {
            event = event.ip(ip.clone());
        }
        self.recorder.log_event(event).await;

        Ok(())
    }
}
