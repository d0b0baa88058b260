use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::ContentQuality;
use crate::services::MintedContentToken;

#[derive(Debug, Deserialize, Validate)]
pub struct ContentTokenRequest {
    pub project_id: Uuid,
    pub resource_id: Uuid,
    pub quality: ContentQuality,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BundleTokenRequest {
    pub project_id: Uuid,

    #[validate(length(min = 1, max = 200, message = "Between 1 and 200 resources per bundle"))]
    pub resource_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContentTokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<MintedContentToken> for ContentTokenResponse {
    fn from(minted: MintedContentToken) -> Self {
        Self {
            token: minted.token,
            expires_at: minted.expires_at,
        }
    }
}
