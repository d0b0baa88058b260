//! Short-lived handles that let the content endpoint serve one resource at one
//! quality (or one bundle) without the browser presenting credentials.
//!
//! A token is 32 random bytes, hex encoded, mapped in the store to a JSON
//! [`ContentGrant`] under `content_token:{token}` with the grant's TTL.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::share_access::AccessContext;
use super::{AccessRepository, SecurityRecorder, ServiceError, SharedStore};
use crate::models::{
    ContentGrant, ContentQuality, ContentScope, ResourceMeta, SecurityEvent, SecurityEventType,
    Severity,
};
use crate::utils::random_hex;

pub const MAX_BUNDLE_RESOURCES: usize = 200;

fn token_key(token: &str) -> String {
    format!("content_token:{}", token)
}

#[derive(Debug, Clone)]
pub struct MintedContentToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ContentTokenService {
    repo: Arc<dyn AccessRepository>,
    store: Arc<dyn SharedStore>,
    recorder: SecurityRecorder,
    ttl: Duration,
}

impl ContentTokenService {
    pub fn new(
        repo: Arc<dyn AccessRepository>,
        store: Arc<dyn SharedStore>,
        recorder: SecurityRecorder,
        ttl: Duration,
    ) -> Self {
        Self {
            repo,
            store,
            recorder,
            ttl,
        }
    }

    /// Loads a resource and checks it belongs to the authorized project.
    async fn owned_resource(
        &self,
        ctx: &AccessContext,
        resource_id: Uuid,
    ) -> Result<ResourceMeta, ServiceError> {
        let resource = self.repo.find_resource(resource_id).await?;
        match resource {
            Some(resource) if resource.project_id == ctx.project_id => Ok(resource),
            Some(_) => {
                self.recorder
                    .log_event(
                        SecurityEvent::new(SecurityEventType::ContentAccessDenied, Severity::Warning)
                            .project(ctx.project_id)
                            .video(resource_id)
                            .session(ctx.session_label())
                            .detail("reason", "cross_project")
                            .blocked(),
                    )
                    .await;
                Err(ServiceError::NotFound("Resource not found".to_string()))
            }
            None => Err(ServiceError::NotFound("Resource not found".to_string())),
        }
    }

    async fn store_grant(
        &self,
        ctx: &AccessContext,
        scope: ContentScope,
    ) -> Result<MintedContentToken, ServiceError> {
        let now = Utc::now();
        let grant = ContentGrant {
            project_id: ctx.project_id,
            session_id: ctx.session_label(),
            is_admin: ctx.is_admin(),
            scope,
            issued_at: now,
            expires_at: now + self.ttl,
        };

        let token = random_hex(32);
        let payload =
            serde_json::to_string(&grant).map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;
        self.store
            .set_with_ttl(
                &token_key(&token),
                &payload,
                self.ttl.num_seconds().max(1) as u64,
            )
            .await
            .map_err(ServiceError::Store)?;

        Ok(MintedContentToken {
            token,
            expires_at: grant.expires_at,
        })
    }

    /// Mints a token for one resource at one quality.
    pub async fn mint(
        &self,
        ctx: &AccessContext,
        resource_id: Uuid,
        quality: ContentQuality,
    ) -> Result<MintedContentToken, ServiceError> {
        let resource = self.owned_resource(ctx, resource_id).await?;

        if quality == ContentQuality::Original {
            if ctx.is_guest() {
                return Err(ServiceError::Forbidden(
                    "Guests cannot download originals".to_string(),
                ));
            }
            if !ctx.is_admin() && !resource.approved {
                return Err(ServiceError::Forbidden(
                    "Original quality requires an approved resource".to_string(),
                ));
            }
        }

        let minted = self
            .store_grant(
                ctx,
                ContentScope::Single {
                    resource_id,
                    quality,
                },
            )
            .await?;

        tracing::debug!(
            project_id = %ctx.project_id,
            resource_id = %resource_id,
            quality = quality.as_str(),
            "Content token minted"
        );
        Ok(minted)
    }

    /// Mints one token that unlocks an archive of several resources.
    pub async fn mint_bundle(
        &self,
        ctx: &AccessContext,
        resource_ids: &[Uuid],
    ) -> Result<MintedContentToken, ServiceError> {
        if ctx.is_guest() {
            return Err(ServiceError::Forbidden(
                "Guests cannot download bundles".to_string(),
            ));
        }
        if resource_ids.is_empty() || resource_ids.len() > MAX_BUNDLE_RESOURCES {
            return Err(ServiceError::Validation(format!(
                "A bundle holds between 1 and {} resources",
                MAX_BUNDLE_RESOURCES
            )));
        }

        let mut unique: Vec<Uuid> = Vec::with_capacity(resource_ids.len());
        for id in resource_ids {
            if unique.contains(id) {
                continue;
            }
            let resource = self.owned_resource(ctx, *id).await?;
            if !ctx.is_admin() && !resource.approved {
                return Err(ServiceError::Forbidden(
                    "Bundles may only contain approved resources".to_string(),
                ));
            }
            unique.push(*id);
        }

        self.store_grant(
            ctx,
            ContentScope::Bundle {
                resource_ids: unique,
            },
        )
        .await
    }

    async fn load_grant(&self, token: &str) -> Result<ContentGrant, ServiceError> {
        if token.len() != 64 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ServiceError::auth_required());
        }

        let raw = self
            .store
            .get(&token_key(token))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Content token lookup failed; denying");
                ServiceError::Store(e)
            })?
            .ok_or_else(ServiceError::auth_required)?;

        let grant: ContentGrant =
            serde_json::from_str(&raw).map_err(|_| ServiceError::auth_required())?;
        if grant.is_expired() {
            return Err(ServiceError::auth_required());
        }
        Ok(grant)
    }

    /// Maps a presented token back to its grant, only for the exact
    /// resource and quality it was minted for.
    pub async fn resolve(
        &self,
        token: &str,
        resource_id: Uuid,
        quality: ContentQuality,
    ) -> Result<ContentGrant, ServiceError> {
        let grant = self.load_grant(token).await?;
        if !grant.covers(resource_id, quality) {
            return Err(ServiceError::Forbidden(
                "Token does not cover this resource".to_string(),
            ));
        }
        Ok(grant)
    }

    /// Resolves a bundle token to its resource list.
    pub async fn resolve_bundle(&self, token: &str) -> Result<(ContentGrant, Vec<Uuid>), ServiceError> {
        let grant = self.load_grant(token).await?;
        match &grant.scope {
            ContentScope::Bundle { resource_ids } => {
                let ids = resource_ids.clone();
                Ok((grant, ids))
            }
            ContentScope::Single { .. } => Err(ServiceError::Forbidden(
                "Token does not cover a bundle".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::models::ResourceKind;
    use crate::services::share_access::AccessLevel;
    use crate::services::{MemoryRepository, MemoryStore};

    struct Harness {
        tokens: ContentTokenService,
        store: Arc<MemoryStore>,
        project: Uuid,
        approved: Uuid,
        draft: Uuid,
        foreign: Uuid,
    }

    fn harness(ttl: Duration) -> Harness {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryStore::new());
        let project = Uuid::new_v4();
        let other_project = Uuid::new_v4();

        let resource = |project_id, approved| ResourceMeta {
            resource_id: Uuid::new_v4(),
            project_id,
            kind: ResourceKind::Video,
            approved,
        };
        let approved = resource(project, true);
        let draft = resource(project, false);
        let foreign = resource(other_project, true);
        let ids = (approved.resource_id, draft.resource_id, foreign.resource_id);
        for r in [approved, draft, foreign] {
            repo.insert_resource(r).unwrap();
        }

        let recorder = SecurityRecorder::new(
            repo.clone(),
            store.clone(),
            AnalyticsConfig {
                page_access_dedupe_minutes: 30,
                video_view_dedupe_minutes: 360,
                download_dedupe_minutes: 60,
            },
        );

        Harness {
            tokens: ContentTokenService::new(repo, store.clone(), recorder, ttl),
            store,
            project,
            approved: ids.0,
            draft: ids.1,
            foreign: ids.2,
        }
    }

    fn ctx(project_id: Uuid, level: AccessLevel) -> AccessContext {
        AccessContext {
            project_id,
            level,
            session_id: Some("sid-1".to_string()),
            method: None,
            email: None,
        }
    }

    #[tokio::test]
    async fn test_token_resolves_only_its_resource_and_quality() {
        let h = harness(Duration::minutes(10));
        let viewer = ctx(h.project, AccessLevel::Share);

        let minted = h
            .tokens
            .mint(&viewer, h.approved, ContentQuality::P720)
            .await
            .unwrap();

        let grant = h
            .tokens
            .resolve(&minted.token, h.approved, ContentQuality::P720)
            .await
            .unwrap();
        assert_eq!(grant.project_id, h.project);
        assert_eq!(grant.session_id, "sid-1");

        assert!(h
            .tokens
            .resolve(&minted.token, h.draft, ContentQuality::P720)
            .await
            .is_err());
        assert!(h
            .tokens
            .resolve(&minted.token, h.approved, ContentQuality::P1080)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_token_dies_with_its_ttl() {
        let h = harness(Duration::seconds(1));
        let viewer = ctx(h.project, AccessLevel::Share);
        let minted = h
            .tokens
            .mint(&viewer, h.approved, ContentQuality::Thumbnail)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
        assert!(matches!(
            h.tokens
                .resolve(&minted.token, h.approved, ContentQuality::Thumbnail)
                .await,
            Err(ServiceError::AuthRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_cross_project_resource_is_refused() {
        let h = harness(Duration::minutes(10));
        let viewer = ctx(h.project, AccessLevel::Admin);
        assert!(matches!(
            h.tokens.mint(&viewer, h.foreign, ContentQuality::P720).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_original_requires_approval_unless_admin() {
        let h = harness(Duration::minutes(10));

        let viewer = ctx(h.project, AccessLevel::Share);
        assert!(matches!(
            h.tokens.mint(&viewer, h.draft, ContentQuality::Original).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(h
            .tokens
            .mint(&viewer, h.approved, ContentQuality::Original)
            .await
            .is_ok());

        let admin = ctx(h.project, AccessLevel::Admin);
        assert!(h
            .tokens
            .mint(&admin, h.draft, ContentQuality::Original)
            .await
            .is_ok());

        let guest = ctx(h.project, AccessLevel::Guest);
        assert!(h
            .tokens
            .mint(&guest, h.approved, ContentQuality::Original)
            .await
            .is_err());
        assert!(h
            .tokens
            .mint(&guest, h.approved, ContentQuality::P720)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_bundle_token_carries_list_and_is_not_a_single_token() {
        let h = harness(Duration::minutes(10));
        let viewer = ctx(h.project, AccessLevel::Share);

        let minted = h
            .tokens
            .mint_bundle(&viewer, &[h.approved, h.approved])
            .await
            .unwrap();
        let (_, ids) = h.tokens.resolve_bundle(&minted.token).await.unwrap();
        assert_eq!(ids, vec![h.approved]);

        assert!(h
            .tokens
            .resolve(&minted.token, h.approved, ContentQuality::Original)
            .await
            .is_err());
        assert!(h.tokens.mint_bundle(&viewer, &[h.draft]).await.is_err());
        assert!(h
            .tokens
            .mint_bundle(&ctx(h.project, AccessLevel::Guest), &[h.approved])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_resolution_fails_closed_on_store_outage() {
        let h = harness(Duration::minutes(10));
        let viewer = ctx(h.project, AccessLevel::Share);
        let minted = h
            .tokens
            .mint(&viewer, h.approved, ContentQuality::P720)
            .await
            .unwrap();

        h.store.set_available(false);
        assert!(matches!(
            h.tokens
                .resolve(&minted.token, h.approved, ContentQuality::P720)
                .await,
            Err(ServiceError::Store(_))
        ));
    }
}
