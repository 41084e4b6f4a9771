// src/cache/mod.rs
//! Two-tier cache: a distributed key-value backend (Redis) in front of an
//! in-process fallback map.
//!
//! `CacheClient` never returns an error. Backend failures are logged and
//! turned into a miss (reads), a write to the memory tier (writes) or a
//! process-local lock (conditional writes).

pub mod memory;
pub mod redis_store;

pub use memory::MemoryCache;
pub use redis_store::RedisStore;

use crate::error::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Namespace prefixed to every key written to the distributed backend.
pub const REDIS_NAMESPACE: &str = "token-dashboard";

/// Raw string store with TTLs and an atomic set-if-absent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    async fn set_raw(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Writes only when the key is absent. `Ok(true)` means this call wrote it.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool>;

    /// Deletes the key only while it still holds `expected`.
    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool>;

    async fn keys(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    backend_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub backend_errors: u64,
}

/// Fail-soft cache facade shared by the refresh coordinator and the fetchers.
pub struct CacheClient {
    primary: Option<Arc<dyn KeyValueStore>>,
    memory: Arc<MemoryCache>,
    counters: CacheCounters,
}

impl CacheClient {
    /// Cache with only the in-process tier.
    pub fn memory_only() -> Self {
        Self {
            primary: None,
            memory: Arc::new(MemoryCache::new()),
            counters: CacheCounters::default(),
        }
    }

    /// Cache fronted by `primary`, falling back to memory on backend errors.
    pub fn with_backend(primary: Arc<dyn KeyValueStore>) -> Self {
        Self {
            primary: Some(primary),
            ..Self::memory_only()
        }
    }

    /// Connects to Redis when a URL is configured. An unreachable or
    /// unconfigured backend yields a memory-only cache.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let Some(url) = redis_url else {
            info!("No REDIS_URL configured, using in-memory cache only");
            return Self::memory_only();
        };

        match RedisStore::connect(url, REDIS_NAMESPACE).await {
            Ok(store) => Self::with_backend(Arc::new(store)),
            Err(e) => {
                warn!("Redis unavailable at startup ({}), degrading to in-memory cache", e);
                Self::memory_only()
            }
        }
    }

    pub fn using_distributed_backend(&self) -> bool {
        self.primary.is_some()
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            backend_errors: self.counters.backend_errors.load(Ordering::Relaxed),
        }
    }

    fn record_backend_error(&self, op: &str, key: &str, err: &dyn std::fmt::Display) {
        self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
        warn!("Cache backend {} failed for '{}': {} (using memory tier)", op, key, err);
    }

    pub async fn get_raw(&self, key: &str) -> Option<String> {
        let value = match &self.primary {
            Some(primary) => match primary.get_raw(key).await {
                Ok(value) => value,
                Err(e) => {
                    self.record_backend_error("GET", key, &e);
                    self.memory.get(key)
                }
            },
            None => self.memory.get(key),
        };

        if value.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache HIT for key: {}", key);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Cache MISS for key: {}", key);
        }
        value
    }

    /// Reads and decodes a JSON value. Undecodable entries count as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to deserialize cached JSON for key {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_raw(&self, key: &str, value: String, ttl: Option<Duration>) {
        if let Some(primary) = &self.primary {
            match primary.set_raw(key, value.clone(), ttl).await {
                Ok(()) => return,
                Err(e) => self.record_backend_error("SET", key, &e),
            }
        }
        self.memory.set(key, value, ttl);
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_string(value) {
            Ok(json) => self.set_raw(key, json, ttl).await,
            Err(e) => warn!("Failed to serialize value for key {}: {}", key, e),
        }
    }

    /// Removes `key` from both tiers.
    pub async fn delete(&self, key: &str) -> bool {
        let mut removed = self.memory.remove(key);
        if let Some(primary) = &self.primary {
            match primary.delete(key).await {
                Ok(deleted) => removed |= deleted,
                Err(e) => self.record_backend_error("DEL", key, &e),
            }
        }
        removed
    }

    pub async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool {
        if let Some(primary) = &self.primary {
            match primary.set_if_absent(key, value.to_string(), ttl).await {
                Ok(acquired) => return acquired,
                Err(e) => self.record_backend_error("SET NX", key, &e),
            }
        }
        self.memory.set_if_absent(key, value.to_string(), ttl)
    }

    pub async fn delete_if_value(&self, key: &str, expected: &str) -> bool {
        // The value may live in either tier depending on where it was acquired
        let mut deleted = self.memory.delete_if_value(key, expected);
        if let Some(primary) = &self.primary {
            match primary.delete_if_value(key, expected).await {
                Ok(d) => deleted |= d,
                Err(e) => self.record_backend_error("DEL IF", key, &e),
            }
        }
        deleted
    }

    pub async fn list_keys(&self) -> Vec<String> {
        if let Some(primary) = &self.primary {
            match primary.keys().await {
                Ok(keys) => return keys,
                Err(e) => self.record_backend_error("KEYS", "*", &e),
            }
        }
        self.memory.list_keys()
    }

    /// Clears the given keys, or every key this dashboard owns.
    /// Returns the number of keys removed.
    pub async fn clear(&self, keys: Option<&[String]>) -> usize {
        match keys {
            Some(keys) => {
                let mut removed = 0;
                for key in keys {
                    if self.delete(key).await {
                        removed += 1;
                    }
                }
                removed
            }
            None => {
                let mut removed = self.memory.clear(None);
                if let Some(primary) = &self.primary {
                    match primary.keys().await {
                        Ok(keys) => {
                            for key in keys {
                                match primary.delete(&key).await {
                                    Ok(true) => removed += 1,
                                    Ok(false) => {}
                                    Err(e) => self.record_backend_error("DEL", &key, &e),
                                }
                            }
                        }
                        Err(e) => self.record_backend_error("KEYS", "*", &e),
                    }
                }
                removed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DashboardError;
    use serde::Deserialize;

    /// Backend that fails every call, standing in for an unreachable Redis.
    pub(crate) struct UnreachableStore;

    #[async_trait]
    impl KeyValueStore for UnreachableStore {
        fn name(&self) -> &str {
            "unreachable"
        }
        async fn get_raw(&self, _key: &str) -> Result<Option<String>> {
            Err(DashboardError::CacheError("connection refused".into()))
        }
        async fn set_raw(&self, _key: &str, _value: String, _ttl: Option<Duration>) -> Result<()> {
            Err(DashboardError::CacheError("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(DashboardError::CacheError("connection refused".into()))
        }
        async fn set_if_absent(&self, _key: &str, _value: String, _ttl: Duration) -> Result<bool> {
            Err(DashboardError::CacheError("connection refused".into()))
        }
        async fn delete_if_value(&self, _key: &str, _expected: &str) -> Result<bool> {
            Err(DashboardError::CacheError("connection refused".into()))
        }
        async fn keys(&self) -> Result<Vec<String>> {
            Err(DashboardError::CacheError("connection refused".into()))
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        symbol: String,
        price: f64,
    }

    #[tokio::test]
    async fn test_memory_only_roundtrip() {
        let cache = CacheClient::memory_only();
        assert!(!cache.using_distributed_backend());
        let sample = Sample { symbol: "ABC".into(), price: 1.5 };
        cache.set("sample", &sample, None).await;
        assert_eq!(cache.get::<Sample>("sample").await, Some(sample));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_backend_errors_degrade_to_memory() {
        let cache = CacheClient::with_backend(Arc::new(UnreachableStore));
        assert!(cache.using_distributed_backend());

        cache.set("k", &42u32, Some(Duration::from_secs(60))).await;
        assert_eq!(cache.get::<u32>("k").await, Some(42));
        assert!(cache.set_if_absent("lock", "me", Duration::from_secs(5)).await);
        assert!(!cache.set_if_absent("lock", "you", Duration::from_secs(5)).await);
        assert!(cache.delete_if_value("lock", "me").await);
        assert!(cache.list_keys().await.contains(&"k".to_string()));
        assert!(cache.stats().backend_errors >= 5);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let cache = CacheClient::memory_only();
        cache.set_raw("bad", "{not json".to_string(), None).await;
        assert_eq!(cache.get::<Sample>("bad").await, None);
    }

    #[tokio::test]
    async fn test_clear_selected_and_all() {
        let cache = CacheClient::memory_only();
        cache.set("a", &1, None).await;
        cache.set("b", &2, None).await;
        cache.set("c", &3, None).await;

        assert_eq!(cache.clear(Some(&["a".to_string()])).await, 1);
        assert_eq!(cache.list_keys().await, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(cache.clear(None).await, 2);
        assert!(cache.list_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_without_url_is_memory_only() {
        let cache = CacheClient::connect(None).await;
        assert!(!cache.using_distributed_backend());
    }
}
