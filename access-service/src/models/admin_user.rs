//! Admin user model - portal operators who sign in with email and password.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

pub const ROLE_ADMIN: &str = "ADMIN";

/// Admin user entity.
#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role_code: String,
    pub display_name: Option<String>,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl AdminUser {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>, role: &str) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            role_code: role.to_string(),
            display_name: None,
            active: true,
            created_utc: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.active && self.role_code == ROLE_ADMIN
    }
}
