//! One-time codes for share recipients.
//!
//! Codes are stored hashed. Attempts are counted per (project, email) whether
//! or not the email is a recipient, and crossing the budget locks the pair out
//! for a cool-down window.

use std::sync::Arc;
use uuid::Uuid;

use super::{ServiceError, SharedStore};
use crate::config::OtpConfig;
use crate::utils::{constant_time_eq, numeric_code, sha256_hex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpOutcome {
    Verified,
    Rejected,
    LockedOut { retry_after_seconds: u64 },
}

#[derive(Clone)]
pub struct OtpVerifier {
    store: Arc<dyn SharedStore>,
    config: OtpConfig,
}

fn subject(project_id: Uuid, email: &str) -> String {
    format!("{}:{}", project_id, email.trim().to_lowercase())
}

impl OtpVerifier {
    pub fn new(store: Arc<dyn SharedStore>, config: OtpConfig) -> Self {
        Self { store, config }
    }

    pub fn expiry_minutes(&self) -> i64 {
        self.config.expiry_minutes
    }

    fn code_key(&self, project_id: Uuid, email: &str) -> String {
        format!("otp:{}", subject(project_id, email))
    }

    fn attempts_key(&self, project_id: Uuid, email: &str) -> String {
        format!("otp_attempts:{}", subject(project_id, email))
    }

    fn lockout_key(&self, project_id: Uuid, email: &str) -> String {
        format!("otp_lockout:{}", subject(project_id, email))
    }

    fn lockout_seconds(&self) -> u64 {
        (self.config.lockout_minutes.max(1) * 60) as u64
    }

    /// Remaining lockout, if any.
    pub async fn lockout_remaining(
        &self,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<u64>, ServiceError> {
        let key = self.lockout_key(project_id, email);
        if !self.store.exists(&key).await.map_err(ServiceError::Store)? {
            return Ok(None);
        }
        let ttl = self
            .store
            .ttl_seconds(&key)
            .await
            .map_err(ServiceError::Store)?
            .unwrap_or_else(|| self.lockout_seconds());
        Ok(Some(ttl.max(1)))
    }

    /// Generates and stores a fresh code, replacing any previous one.
    /// Returns `None` while the pair is locked out.
    pub async fn issue(&self, project_id: Uuid, email: &str) -> Result<Option<String>, ServiceError> {
        if self.lockout_remaining(project_id, email).await?.is_some() {
            return Ok(None);
        }

        let code = numeric_code(self.config.code_length);
        self.store
            .set_with_ttl(
                &self.code_key(project_id, email),
                &sha256_hex(&code),
                (self.config.expiry_minutes.max(1) * 60) as u64,
            )
            .await
            .map_err(ServiceError::Store)?;

        Ok(Some(code))
    }

    /// Checks `code`. `is_recipient` is decided by the caller; a non-recipient
    /// is rejected exactly like a wrong code and spends an attempt.
    pub async fn verify(
        &self,
        project_id: Uuid,
        email: &str,
        code: &str,
        is_recipient: bool,
    ) -> Result<OtpOutcome, ServiceError> {
        if let Some(retry_after_seconds) = self.lockout_remaining(project_id, email).await? {
            return Ok(OtpOutcome::LockedOut {
                retry_after_seconds,
            });
        }

        let code_key = self.code_key(project_id, email);
        let matches = if is_recipient {
            match self.store.get(&code_key).await.map_err(ServiceError::Store)? {
                Some(stored) => constant_time_eq(&stored, &sha256_hex(code.trim())),
                None => false,
            }
        } else {
            false
        };

        if matches {
            // Only the call that removes the code wins; a concurrent
            // submission of the same code sees it gone.
            let consumed = self.store.delete(&code_key).await.map_err(ServiceError::Store)?;
            if !consumed {
                return Ok(OtpOutcome::Rejected);
            }
            self.store
                .delete(&self.attempts_key(project_id, email))
                .await
                .map_err(ServiceError::Store)?;
            return Ok(OtpOutcome::Verified);
        }

        let (attempts, _) = self
            .store
            .increment_in_window(&self.attempts_key(project_id, email), self.lockout_seconds())
            .await
            .map_err(ServiceError::Store)?;

        if attempts >= self.config.max_attempts {
            let lockout = self.lockout_seconds();
            self.store
                .set_with_ttl(&self.lockout_key(project_id, email), "1", lockout)
                .await
                .map_err(ServiceError::Store)?;
            self.store.delete(&code_key).await.map_err(ServiceError::Store)?;
            self.store
                .delete(&self.attempts_key(project_id, email))
                .await
                .map_err(ServiceError::Store)?;

            tracing::warn!(project_id = %project_id, "OTP attempts exhausted; locked out");
            return Ok(OtpOutcome::LockedOut {
                retry_after_seconds: lockout,
            });
        }

        Ok(OtpOutcome::Rejected)
    }
}
