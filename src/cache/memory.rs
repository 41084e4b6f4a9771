// src/cache/memory.rs
//! In-process fallback tier used when the distributed backend is unavailable.
//!
//! Entries expire lazily: an expired entry is removed by the read that finds it.
//! There is no size bound or LRU policy, so a long backend outage grows this map
//! with the number of distinct keys written.

use super::KeyValueStore;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use log::debug;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value, or `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }

        // Another writer may have replaced it since the guard was dropped
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        debug!("Memory cache entry expired: {}", key);
        None
    }

    /// Overwrites `key`. Without a TTL the entry never expires.
    pub fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        self.entries.insert(key.to_string(), MemoryEntry::new(value, ttl));
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Atomically stores `value` only if no live entry exists under `key`.
    pub fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(MemoryEntry::new(value, Some(ttl)));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryEntry::new(value, Some(ttl)));
                true
            }
        }
    }

    pub fn delete_if_value(&self, key: &str, expected: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove_if(key, |_, entry| !entry.is_expired(now) && entry.value == expected)
            .is_some()
    }

    /// Clears the given keys, or everything when `keys` is `None`.
    /// Returns how many entries were removed.
    pub fn clear(&self, keys: Option<&[String]>) -> usize {
        match keys {
            Some(keys) => keys.iter().filter(|key| self.remove(key)).count(),
            None => {
                let count = self.entries.len();
                self.entries.clear();
                count
            }
        }
    }

    /// Live keys, sorted.
    pub fn list_keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        self.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.remove(key))
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        Ok(MemoryCache::set_if_absent(self, key, value, ttl))
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool> {
        Ok(MemoryCache::delete_if_value(self, key, expected))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.list_keys())
    }
}
