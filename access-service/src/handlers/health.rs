use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Pings Postgres and Redis. 503 when either is down.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.repo.health_check().await;
    let store = state.store.health_check().await;

    if let Err(e) = &database {
        tracing::error!(error = %e, "Database health check failed");
    }
    if let Err(e) = &store {
        tracing::error!(error = %e, "Store health check failed");
    }

    let healthy = database.is_ok() && store.is_ok();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "service": state.config.service_name,
            "version": state.config.service_version,
            "database": if database.is_ok() { "up" } else { "down" },
            "store": if store.is_ok() { "up" } else { "down" },
        })),
    )
}

pub async fn metrics() -> impl IntoResponse {
    crate::services::metrics::get_metrics()
}
