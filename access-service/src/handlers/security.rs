//! Operator views over rate-limit counters and the security audit trail.
//! Admin session required.

use axum::{
    extract::State,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use service_core::error::AppError;

use crate::dtos::security::{
    ClearRateLimitRequest, ClearRateLimitResponse, PruneEventsQuery, PruneEventsResponse,
    RateLimitListResponse, SecurityEventListQuery, SecurityEventListResponse,
};
use crate::middleware::AdminSession;
use crate::models::SecurityEventQuery;
use crate::utils::{ValidatedJson, ValidatedQuery};
use crate::AppState;

const DEFAULT_EVENT_LIMIT: i64 = 100;

/// GET /security/rate-limits
pub async fn list_rate_limits(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
) -> Result<impl IntoResponse, AppError> {
    let limited = state.limiter.list_limited().await?;
    Ok(Json(RateLimitListResponse { limited }))
}

/// DELETE /security/rate-limits
pub async fn clear_rate_limit(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    ValidatedJson(req): ValidatedJson<ClearRateLimitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cleared = state.limiter.clear(&req.key).await?;
    tracing::info!(user_id = %admin.user_id, cleared, "Rate limit key cleared");
    Ok(Json(ClearRateLimitResponse { cleared }))
}

/// GET /security/events
pub async fn list_security_events(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
    ValidatedQuery(query): ValidatedQuery<SecurityEventListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let events = state
        .repo
        .list_security_events(&SecurityEventQuery {
            event_type: query.event_type,
            project_id: query.project_id,
            limit: query.limit.unwrap_or(DEFAULT_EVENT_LIMIT),
        })
        .await?;

    Ok(Json(SecurityEventListResponse { events }))
}

/// DELETE /security/events?older_than_days=N
pub async fn prune_security_events(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    ValidatedQuery(query): ValidatedQuery<PruneEventsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let cutoff = Utc::now() - Duration::days(query.older_than_days);
    let deleted = state.repo.delete_security_events_before(cutoff).await?;

    tracing::info!(user_id = %admin.user_id, deleted, "Pruned security events");
    Ok(Json(PruneEventsResponse { deleted }))
}
