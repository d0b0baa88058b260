//! Shared fast state store.
//!
//! Every piece of cross-request state (session lineages, revocation entries,
//! share sessions, rate-limit counters, dedupe flags, content grants) lives
//! behind [`SharedStore`], so worker processes stay stateless and the backing
//! technology can be swapped without touching business logic.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error>;

    /// Atomically writes `value` only when `key` is absent. Returns `true`
    /// when this call created the key.
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, anyhow::Error>;

    /// Returns `true` when a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error>;

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error>;

    /// Remaining lifetime, `None` when the key is missing or never expires.
    async fn ttl_seconds(&self, key: &str) -> Result<Option<u64>, anyhow::Error>;

    /// Atomic increment of a fixed-window counter. The window starts when the
    /// key is created. Returns the new count and the seconds left in the window.
    async fn increment_in_window(
        &self,
        key: &str,
        window_seconds: u64,
    ) -> Result<(u64, u64), anyhow::Error>;

    /// Adds `member` to a set and (re)arms the set's expiry.
    async fn add_to_set_with_ttl(
        &self,
        key: &str,
        member: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error>;

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, anyhow::Error>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, anyhow::Error>;

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), anyhow::Error>;

    /// Keys starting with `prefix`. Intended for operator views, not hot paths.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get key: {}", e))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set key: {}", e))
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set key if absent: {}", e))?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete key: {}", e))?;

        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check key: {}", e))
    }

    async fn ttl_seconds(&self, key: &str) -> Result<Option<u64>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let ttl: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read TTL: {}", e))?;

        // -2: missing, -1: no expiry
        Ok((ttl >= 0).then_some(ttl as u64))
    }

    async fn increment_in_window(
        &self,
        key: &str,
        window_seconds: u64,
    ) -> Result<(u64, u64), anyhow::Error> {
        let mut conn = self.manager.clone();
        let window = window_seconds.max(1);

        // SET NX arms the window only for the first hit; INCR keeps the TTL.
        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("EX")
            .arg(window)
            .arg("NX")
            .ignore()
            .cmd("INCR")
            .arg(key)
            .cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to increment counter: {}", e))?;

        let remaining = if ttl > 0 { ttl as u64 } else { window };
        Ok((count, remaining))
    }

    async fn add_to_set_with_ttl(
        &self,
        key: &str,
        member: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(key)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds.max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to add set member: {}", e))
    }

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check set member: {}", e))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read set: {}", e))
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let _: u64 = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to remove set member: {}", e))?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to scan keys: {}", e))?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

#[derive(Debug, Clone)]
enum MemoryValue {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }

    fn remaining(&self, now: Instant) -> Option<u64> {
        self.expires_at
            .map(|at| at.saturating_duration_since(now).as_secs_f64().ceil() as u64)
    }
}

/// In-process store for tests and single-node development.
///
/// Every operation runs under one lock, so check-and-set primitives keep the
/// same atomicity guarantees as the Redis adapter.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates an outage: every call fails until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, MemoryEntry>, Instant) -> T,
    ) -> Result<T, anyhow::Error> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("memory store unavailable"));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(f(&mut entries, now))
    }
}

fn expiry(now: Instant, ttl_seconds: u64) -> Option<Instant> {
    Some(now + Duration::from_secs(ttl_seconds.max(1)))
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        self.with_entries(|entries, _| match entries.get(key).map(|e| &e.value) {
            Some(MemoryValue::Text(v)) => Some(v.clone()),
            _ => None,
        })
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: MemoryValue::Text(value.to_string()),
                    expires_at: expiry(now, ttl_seconds),
                },
            );
        })
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, anyhow::Error> {
        self.with_entries(|entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: MemoryValue::Text(value.to_string()),
                    expires_at: expiry(now, ttl_seconds),
                },
            );
            true
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        self.with_entries(|entries, _| entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
        self.with_entries(|entries, _| entries.contains_key(key))
    }

    async fn ttl_seconds(&self, key: &str) -> Result<Option<u64>, anyhow::Error> {
        self.with_entries(|entries, now| entries.get(key).and_then(|e| e.remaining(now)))
    }

    async fn increment_in_window(
        &self,
        key: &str,
        window_seconds: u64,
    ) -> Result<(u64, u64), anyhow::Error> {
        self.with_entries(|entries, now| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| MemoryEntry {
                value: MemoryValue::Text("0".to_string()),
                expires_at: expiry(now, window_seconds),
            });

            let current = match &entry.value {
                MemoryValue::Text(v) => v.parse::<u64>().unwrap_or(0),
                MemoryValue::Set(_) => 0,
            };
            let count = current + 1;
            entry.value = MemoryValue::Text(count.to_string());

            let remaining = entry.remaining(now).unwrap_or(window_seconds).max(1);
            (count, remaining)
        })
    }

    async fn add_to_set_with_ttl(
        &self,
        key: &str,
        member: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        self.with_entries(|entries, now| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| MemoryEntry {
                value: MemoryValue::Set(HashSet::new()),
                expires_at: None,
            });
            if !matches!(entry.value, MemoryValue::Set(_)) {
                entry.value = MemoryValue::Set(HashSet::new());
            }
            if let MemoryValue::Set(members) = &mut entry.value {
                members.insert(member.to_string());
            }
            entry.expires_at = expiry(now, ttl_seconds);
        })
    }

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, anyhow::Error> {
        self.with_entries(|entries, _| match entries.get(key).map(|e| &e.value) {
            Some(MemoryValue::Set(members)) => members.contains(member),
            _ => false,
        })
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, anyhow::Error> {
        self.with_entries(|entries, _| match entries.get(key).map(|e| &e.value) {
            Some(MemoryValue::Set(members)) => members.iter().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), anyhow::Error> {
        self.with_entries(|entries, _| {
            if let Some(MemoryValue::Set(members)) = entries.get_mut(key).map(|e| &mut e.value) {
                members.remove(member);
            }
        })
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, anyhow::Error> {
        self.with_entries(|entries, _| {
            let mut keys: Vec<String> = entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            keys
        })
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.with_entries(|_, _| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_if_absent_only_first_wins() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent_with_ttl("k", "a", 60).await.unwrap());
        assert!(!store.set_if_absent_with_ttl("k", "b", 60).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "v", 1).await.unwrap();
        assert!(store.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!store.exists("k").await.unwrap());
        assert!(store.set_if_absent_with_ttl("k", "again", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_counter_keeps_first_expiry() {
        let store = MemoryStore::new();
        let (first, ttl) = store.increment_in_window("c", 60).await.unwrap();
        let (second, _) = store.increment_in_window("c", 60).await.unwrap();
        assert_eq!((first, second), (1, 2));
        assert!(ttl <= 60 && ttl > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let tasks = (0..50).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.increment_in_window("c", 60).await.unwrap() })
        });
        futures::future::join_all(tasks).await;

        let (count, _) = store.increment_in_window("c", 60).await.unwrap();
        assert_eq!(count, 51);
    }

    #[tokio::test]
    async fn test_set_membership() {
        let store = MemoryStore::new();
        store.add_to_set_with_ttl("s", "a", 60).await.unwrap();
        store.add_to_set_with_ttl("s", "b", 60).await.unwrap();
        assert!(store.is_set_member("s", "a").await.unwrap());
        assert!(!store.is_set_member("s", "c").await.unwrap());

        store.remove_from_set("s", "a").await.unwrap();
        let mut members = store.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_scan_prefix_and_outage() {
        let store = MemoryStore::new();
        store.set_with_ttl("ratelimit:a:1", "1", 60).await.unwrap();
        store.set_with_ttl("other", "1", 60).await.unwrap();
        assert_eq!(
            store.scan_prefix("ratelimit:").await.unwrap(),
            vec!["ratelimit:a:1".to_string()]
        );

        store.set_available(false);
        assert!(store.get("other").await.is_err());
        assert!(store.health_check().await.is_err());
    }
}
