use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{LimitedKey, SecurityEvent, SecurityEventType};

#[derive(Debug, Deserialize, Validate)]
pub struct ClearRateLimitRequest {
    #[validate(length(min = 1, message = "Key is required"))]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct RateLimitListResponse {
    pub limited: Vec<LimitedKey>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearRateLimitResponse {
    pub cleared: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SecurityEventListQuery {
    pub event_type: Option<SecurityEventType>,
    pub project_id: Option<Uuid>,
    #[validate(range(min = 1, max = 500, message = "Limit must be between 1 and 500"))]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecurityEventListResponse {
    pub events: Vec<SecurityEvent>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PruneEventsQuery {
    #[validate(range(min = 1, message = "older_than_days must be positive"))]
    pub older_than_days: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PruneEventsResponse {
    pub deleted: u64,
}
