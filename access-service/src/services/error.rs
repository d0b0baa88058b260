use service_core::error::AppError;
use thiserror::Error;

/// Message shared by every credential check whose failure reason must not leak.
pub const GENERIC_AUTH_FAILURE: &str = "Invalid or expired code";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn auth_required() -> Self {
        ServiceError::AuthRequired("Authentication required".to_string())
    }

    pub fn generic_credentials() -> Self {
        ServiceError::AuthRequired(GENERIC_AUTH_FAILURE.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::AuthRequired(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::RateLimited {
                retry_after_seconds,
            } => AppError::TooManyRequests(
                "Too many requests. Please try again later.".to_string(),
                Some(retry_after_seconds),
            ),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Store(e) => AppError::InternalError(e.context("shared store")),
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
