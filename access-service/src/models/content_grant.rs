//! Content grant - the server-side payload behind a content access token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Renditions the content endpoint knows how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentQuality {
    #[serde(rename = "thumbnail")]
    Thumbnail,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "timeline-vtt")]
    TimelineVtt,
    #[serde(rename = "timeline-sprite")]
    TimelineSprite,
}

impl ContentQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentQuality::Thumbnail => "thumbnail",
            ContentQuality::P720 => "720p",
            ContentQuality::P1080 => "1080p",
            ContentQuality::Original => "original",
            ContentQuality::TimelineVtt => "timeline-vtt",
            ContentQuality::TimelineSprite => "timeline-sprite",
        }
    }

    /// Renditions a guest may stream.
    pub fn is_playback(&self) -> bool {
        !matches!(self, ContentQuality::Original)
    }
}

impl std::str::FromStr for ContentQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thumbnail" => Ok(ContentQuality::Thumbnail),
            "720p" => Ok(ContentQuality::P720),
            "1080p" => Ok(ContentQuality::P1080),
            "original" => Ok(ContentQuality::Original),
            "timeline-vtt" => Ok(ContentQuality::TimelineVtt),
            "timeline-sprite" => Ok(ContentQuality::TimelineSprite),
            _ => Err(format!("Unknown quality: {}", s)),
        }
    }
}

/// What a token unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ContentScope {
    Single {
        resource_id: Uuid,
        quality: ContentQuality,
    },
    Bundle {
        resource_ids: Vec<Uuid>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGrant {
    pub project_id: Uuid,
    /// Session the token was minted for (admin lineage or share session id).
    pub session_id: String,
    pub is_admin: bool,
    #[serde(flatten)]
    pub scope: ContentScope,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ContentGrant {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// True only for a single-resource grant matching both id and quality.
    pub fn covers(&self, resource_id: Uuid, quality: ContentQuality) -> bool {
        match &self.scope {
            ContentScope::Single {
                resource_id: granted,
                quality: granted_quality,
            } => *granted == resource_id && *granted_quality == quality,
            ContentScope::Bundle { .. } => false,
        }
    }
}
