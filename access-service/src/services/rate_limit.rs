//! Fixed-window limiter keyed by `(action, identity)` in the shared store.
//!
//! Counter keys are `ratelimit:{action}:{identity}`. The window starts at the
//! first hit for that key. A store failure lets the request through.

use std::sync::Arc;

use super::{metrics, SecurityRecorder, ServiceError, SharedStore};
use crate::config::RateLimitConfig;
use crate::models::{
    LimitedKey, RateLimitAction, RateLimitDecision, SecurityEvent, SecurityEventType, Severity,
};

pub const RATE_LIMIT_PREFIX: &str = "ratelimit:";

pub fn counter_key(action: RateLimitAction, identity: &str) -> String {
    format!("{}{}:{}", RATE_LIMIT_PREFIX, action.as_str(), identity)
}

/// Splits a counter key back into its action and identity.
pub fn parse_counter_key(key: &str) -> Option<(RateLimitAction, &str)> {
    let rest = key.strip_prefix(RATE_LIMIT_PREFIX)?;
    let (action, identity) = rest.split_once(':')?;
    if identity.is_empty() {
        return None;
    }
    Some((RateLimitAction::from_code(action)?, identity))
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    recorder: SecurityRecorder,
    policies: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        recorder: SecurityRecorder,
        policies: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            recorder,
            policies,
        }
    }

    /// Reads the counter without touching it. Limited once the count has
    /// reached the maximum.
    pub async fn check(&self, action: RateLimitAction, identity: &str) -> RateLimitDecision {
        let policy = self.policies.policy(action);
        let key = counter_key(action, identity);

        let count = match self.store.get(&key).await {
            Ok(value) => value.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0),
            Err(e) => {
                tracing::warn!(action = action.as_str(), error = %e, "Rate limit check failed open");
                return RateLimitDecision::allowed(0);
            }
        };

        if count < policy.max_requests {
            return RateLimitDecision::allowed(count);
        }

        let retry_after = self
            .store
            .ttl_seconds(&key)
            .await
            .ok()
            .flatten()
            .unwrap_or(policy.window_seconds)
            .max(1);

        RateLimitDecision {
            limited: true,
            count,
            retry_after_seconds: Some(retry_after),
        }
    }

    /// Counts one request. Limited once the count exceeds the maximum.
    pub async fn hit(&self, action: RateLimitAction, identity: &str) -> RateLimitDecision {
        let policy = self.policies.policy(action);
        let key = counter_key(action, identity);

        let (count, remaining) = match self
            .store
            .increment_in_window(&key, policy.window_seconds)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(action = action.as_str(), error = %e, "Rate limit increment failed open");
                return RateLimitDecision::allowed(0);
            }
        };

        if count <= policy.max_requests {
            return RateLimitDecision::allowed(count);
        }

        // Audit the first rejection of each window only.
        if count == policy.max_requests + 1 {
            self.recorder
                .log_event(
                    SecurityEvent::new(SecurityEventType::RateLimitExceeded, Severity::Warning)
                        .detail("action", action.as_str())
                        .detail("identity", identity)
                        .blocked(),
                )
                .await;
        }

        RateLimitDecision {
            limited: true,
            count,
            retry_after_seconds: Some(remaining.max(1)),
        }
    }

    /// Fails with `RateLimited` when the counter is already at its maximum.
    pub async fn ensure_allowed(
        &self,
        action: RateLimitAction,
        identity: &str,
    ) -> Result<(), ServiceError> {
        into_result(action, self.check(action, identity).await)
    }

    /// Counts one request and fails with `RateLimited` past the maximum.
    pub async fn enforce(&self, action: RateLimitAction, identity: &str) -> Result<(), ServiceError> {
        into_result(action, self.hit(action, identity).await)
    }

    /// Counters currently at or over their limit.
    pub async fn list_limited(&self) -> Result<Vec<LimitedKey>, ServiceError> {
        let keys = self
            .store
            .scan_prefix(RATE_LIMIT_PREFIX)
            .await
            .map_err(ServiceError::Store)?;

        let mut limited = Vec::new();
        for key in keys {
            let Some((action, identity)) = parse_counter_key(&key) else {
                continue;
            };
            let policy = self.policies.policy(action);

            let count = match self.store.get(&key).await.map_err(ServiceError::Store)? {
                Some(value) => value.parse::<u64>().unwrap_or(0),
                None => continue,
            };
            if count < policy.max_requests {
                continue;
            }

            let retry_after_seconds = self
                .store
                .ttl_seconds(&key)
                .await
                .map_err(ServiceError::Store)?
                .unwrap_or(0);

            limited.push(LimitedKey {
                key: key.clone(),
                action,
                identity: identity.to_string(),
                count,
                limit: policy.max_requests,
                retry_after_seconds,
            });
        }

        Ok(limited)
    }

    /// Deletes one counter. Only well-formed rate-limit keys are accepted.
    pub async fn clear(&self, key: &str) -> Result<bool, ServiceError> {
        if parse_counter_key(key).is_none() {
            return Err(ServiceError::Validation(
                "Not a rate limit key".to_string(),
            ));
        }

        let removed = self.store.delete(key).await.map_err(ServiceError::Store)?;
        tracing::info!(key = %key, removed, "Rate limit counter cleared");
        Ok(removed)
    }
}

fn into_result(action: RateLimitAction, decision: RateLimitDecision) -> Result<(), ServiceError> {
    if decision.limited {
        metrics::record_rate_limited(action.as_str());
        return Err(ServiceError::RateLimited {
            retry_after_seconds: decision.retry_after_seconds.unwrap_or(1),
        });
    }
    Ok(())
}
