// src/cache/redis_store.rs
//! Redis-backed distributed tier shared by every dashboard process.

use super::KeyValueStore;
use crate::error::{DashboardError, Result};
use crate::utils::redact_credentials;
use async_trait::async_trait;
use log::{debug, error, info};
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use std::fmt;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deletes KEYS[1] only while it still holds ARGV[1].
const DELETE_IF_VALUE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// A shared Redis client.
/// Uses a `ConnectionManager` for automatic reconnection; every key is stored
/// under `namespace:` so clearing never touches foreign keys.
#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
    namespace: String,
    redis_url: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("redis_url", &self.redis_url)
            .field("namespace", &self.namespace)
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

impl RedisStore {
    pub async fn connect(redis_url: &str, namespace: &str) -> Result<Self> {
        let display_url = redact_credentials(redis_url);
        info!("Initializing Redis connection manager for URL: {}", display_url);
        let client = redis::Client::open(redis_url)?;
        let conn_manager = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                DashboardError::CacheError(format!(
                    "Timed out after {:?} connecting to Redis",
                    CONNECT_TIMEOUT
                ))
            })?
            .map_err(|e| {
                error!("Failed to create Redis ConnectionManager: {}", e);
                DashboardError::from(e)
            })?;
        info!("Redis ConnectionManager initialized (namespace '{}')", namespace);
        Ok(Self {
            conn_manager,
            namespace: namespace.to_string(),
            redis_url: display_url,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn strip_namespace<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        full_key
            .strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let key = self.full_key(key);
        let mut conn = self.conn_manager.clone();
        let value = conn.get::<_, Option<String>>(&key).await?;
        debug!("Redis GET {} -> {}", key, if value.is_some() { "hit" } else { "miss" });
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let key = self.full_key(key);
        let mut conn = self.conn_manager.clone();
        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(&key, value, secs).await?;
                debug!("Redis SETEX {} ({}s)", key, secs);
            }
            None => {
                conn.set::<_, _, ()>(&key, value).await?;
                debug!("Redis SET {}", key);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = self.full_key(key);
        let mut conn = self.conn_manager.clone();
        let count = conn.del::<_, i32>(&key).await?;
        Ok(count > 0)
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let key = self.full_key(key);
        let mut conn = self.conn_manager.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        // SET NX PX answers "OK" when written and nil when the key exists
        let reply = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool> {
        let key = self.full_key(key);
        let mut conn = self.conn_manager.clone();
        let deleted = Script::new(DELETE_IF_VALUE_SCRIPT)
            .key(&key)
            .arg(expected)
            .invoke_async::<_, i32>(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let pattern = format!("{}:*", self.namespace);
        let full_keys = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async::<_, Vec<String>>(&mut conn)
            .await?;
        let mut keys: Vec<String> = full_keys
            .iter()
            .filter_map(|k| self.strip_namespace(k).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
