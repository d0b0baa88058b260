//! Project access configuration and resource ownership, as read from the
//! persistent store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a share link is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMode {
    Password,
    Otp,
    Both,
    None,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Password => "PASSWORD",
            AuthMode::Otp => "OTP",
            AuthMode::Both => "BOTH",
            AuthMode::None => "NONE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "PASSWORD" => Some(AuthMode::Password),
            "OTP" => Some(AuthMode::Otp),
            "BOTH" => Some(AuthMode::Both),
            "NONE" => Some(AuthMode::None),
            _ => None,
        }
    }

    pub fn requires_credentials(&self) -> bool {
        !matches!(self, AuthMode::None)
    }

    pub fn allows_password(&self) -> bool {
        matches!(self, AuthMode::Password | AuthMode::Both)
    }

    pub fn allows_otp(&self) -> bool {
        matches!(self, AuthMode::Otp | AuthMode::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    InReview,
    Approved,
    Closed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::InReview => "IN_REVIEW",
            ProjectStatus::Approved => "APPROVED",
            ProjectStatus::Closed => "CLOSED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "IN_REVIEW" => Some(ProjectStatus::InReview),
            "APPROVED" => Some(ProjectStatus::Approved),
            "CLOSED" => Some(ProjectStatus::Closed),
            _ => None,
        }
    }
}

/// Everything the resolver needs to know about a project.
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project_id: Uuid,
    pub title: String,
    pub auth_mode: AuthMode,
    /// Argon2 PHC string; absent when the project has no password set.
    pub password_hash: Option<String>,
    pub guest_mode: bool,
    pub status: ProjectStatus,
}

impl ProjectAccess {
    pub fn is_closed(&self) -> bool {
        self.status == ProjectStatus::Closed
    }

    /// Open to anyone holding the link.
    pub fn is_public(&self) -> bool {
        !self.auth_mode.requires_credentials() && !self.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Video,
    Photo,
    Asset,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Photo => "photo",
            ResourceKind::Asset => "asset",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "video" => Some(ResourceKind::Video),
            "photo" => Some(ResourceKind::Photo),
            "asset" => Some(ResourceKind::Asset),
            _ => None,
        }
    }
}

/// Ownership and approval state of a media artifact.
#[derive(Debug, Clone)]
pub struct ResourceMeta {
    pub resource_id: Uuid,
    pub project_id: Uuid,
    pub kind: ResourceKind,
    pub approved: bool,
}
