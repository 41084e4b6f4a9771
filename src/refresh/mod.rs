// src/refresh/mod.rs
//! Refresh coordination shared by every dashboard process.
//!
//! Each data domain has a fixed refresh interval and a last-refresh timestamp
//! kept in the shared cache. A domain is FRESH until `last + interval`, STALE
//! afterwards, and REFRESHING while some process holds its refresh lock. The
//! lock is a set-if-absent key with a TTL, so a holder that dies without
//! releasing it blocks refreshes for at most one lease.

pub mod scheduler;

use crate::cache::CacheClient;
use crate::config::Config;
use chrono::{DateTime, TimeZone, Utc};
use futures::FutureExt;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A named category of cached data with its own interval, cache key and lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataDomain {
    AllTokens,
    MarketStats,
    TokenScores,
    TokenDetail(String),
    Pair(String),
}

impl DataDomain {
    /// Domains refreshed by the scheduler and by `refresh_all`.
    pub const AGGREGATE: [DataDomain; 3] = [
        DataDomain::AllTokens,
        DataDomain::MarketStats,
        DataDomain::TokenScores,
    ];

    pub fn id(&self) -> String {
        match self {
            DataDomain::AllTokens => "all_tokens".to_string(),
            DataDomain::MarketStats => "market_stats".to_string(),
            DataDomain::TokenScores => "token_scores".to_string(),
            DataDomain::TokenDetail(address) => format!("token_detail:{}", address),
            DataDomain::Pair(address) => format!("pair:{}", address),
        }
    }

    pub fn cache_key(&self) -> String {
        format!("data:{}", self.id())
    }

    pub fn timestamp_key(&self) -> String {
        format!("last_refresh:{}", self.id())
    }

    pub fn lock_key(&self) -> String {
        format!("refresh_lock:{}", self.id())
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            DataDomain::AllTokens | DataDomain::MarketStats | DataDomain::TokenScores
        )
    }
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Fresh,
    Stale,
    Refreshing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshTiming {
    pub time_remaining: Duration,
    pub last_refresh_time: Option<DateTime<Utc>>,
    pub next_refresh_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub aggregate_interval: Duration,
    pub dex_interval: Duration,
    pub lock_ttl: Duration,
    pub guard: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            aggregate_interval: Duration::from_secs(3_600),
            dex_interval: Duration::from_secs(300),
            lock_ttl: Duration::from_secs(300),
            guard: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for RefreshSettings {
    fn from(config: &Config) -> Self {
        Self {
            aggregate_interval: config.aggregate_refresh_interval(),
            dex_interval: config.dex_refresh_interval(),
            lock_ttl: config.refresh_lock_ttl(),
            guard: config.refresh_guard(),
        }
    }
}

/// Proof of holding a domain's refresh lock.
#[derive(Debug)]
pub struct RefreshLock {
    domain: DataDomain,
    token: String,
}

impl RefreshLock {
    pub fn domain(&self) -> &DataDomain {
        &self.domain
    }
}

/// Result of running work under a refresh lock.
#[derive(Debug, Clone, PartialEq)]
pub enum LockOutcome<T> {
    Acquired(T),
    /// Another process holds the lock; the work did not run.
    Contended,
}

pub struct RefreshCoordinator {
    cache: Arc<CacheClient>,
    settings: RefreshSettings,
}

impl RefreshCoordinator {
    pub fn new(cache: Arc<CacheClient>, settings: RefreshSettings) -> Self {
        Self { cache, settings }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    pub fn interval_for(&self, domain: &DataDomain) -> Duration {
        if domain.is_aggregate() {
            self.settings.aggregate_interval
        } else {
            self.settings.dex_interval
        }
    }

    pub async fn last_refresh_time(&self, domain: &DataDomain) -> Option<DateTime<Utc>> {
        let millis = self.cache.get::<i64>(&domain.timestamp_key()).await?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Time left before `domain` becomes eligible for refresh. A domain that
    /// was never refreshed is due immediately.
    pub async fn time_until_next_refresh(&self, domain: &DataDomain) -> RefreshTiming {
        let Some(last) = self.last_refresh_time(domain).await else {
            return RefreshTiming {
                time_remaining: Duration::ZERO,
                last_refresh_time: None,
                next_refresh_time: None,
            };
        };

        let interval = chrono::Duration::from_std(self.interval_for(domain))
            .unwrap_or_else(|_| chrono::Duration::zero());
        let next = last + interval;
        let time_remaining = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        RefreshTiming {
            time_remaining,
            last_refresh_time: Some(last),
            next_refresh_time: Some(next),
        }
    }

    pub async fn is_refresh_due(&self, domain: &DataDomain) -> bool {
        self.time_until_next_refresh(domain).await.time_remaining.is_zero()
    }

    /// True when the remaining time is within the guard threshold. The
    /// scheduler only refreshes in this window so near-simultaneous triggers
    /// far from the deadline do nothing.
    pub async fn is_within_guard(&self, domain: &DataDomain) -> bool {
        self.time_until_next_refresh(domain).await.time_remaining <= self.settings.guard
    }

    /// True when `domain` was refreshed at or after `since`, at the
    /// millisecond precision timestamps are stored with. A caller that saw
    /// the domain as due and then won the lock uses this to detect that
    /// another holder refreshed it in between.
    pub async fn refreshed_since(&self, domain: &DataDomain, since: DateTime<Utc>) -> bool {
        self.last_refresh_time(domain)
            .await
            .is_some_and(|last| last.timestamp_millis() >= since.timestamp_millis())
    }

    pub async fn state(&self, domain: &DataDomain) -> RefreshState {
        if self.cache.get_raw(&domain.lock_key()).await.is_some() {
            RefreshState::Refreshing
        } else if self.is_refresh_due(domain).await {
            RefreshState::Stale
        } else {
            RefreshState::Fresh
        }
    }

    /// Marks a successful upstream fetch for `domain` at the current time.
    pub async fn record_refresh(&self, domain: &DataDomain) {
        self.record_refresh_at(domain, Utc::now()).await;
    }

    pub async fn record_refresh_at(&self, domain: &DataDomain, at: DateTime<Utc>) {
        self.cache
            .set(&domain.timestamp_key(), &at.timestamp_millis(), None)
            .await;
        debug!("Recorded refresh of {} at {}", domain, at);
    }

    /// Attempts to take the refresh lock for `domain`. `None` means another
    /// holder has it, which is the normal signal to serve cached data.
    pub async fn acquire_refresh_lock(&self, domain: &DataDomain) -> Option<RefreshLock> {
        let token = Uuid::new_v4().to_string();
        if self
            .cache
            .set_if_absent(&domain.lock_key(), &token, self.settings.lock_ttl)
            .await
        {
            debug!("🔒 Acquired refresh lock for {}", domain);
            Some(RefreshLock {
                domain: domain.clone(),
                token,
            })
        } else {
            debug!("Refresh lock for {} is held elsewhere", domain);
            None
        }
    }

    /// Releases a lock. Returns `false` if the lease already expired and the
    /// key now belongs to someone else (or to nobody).
    pub async fn release_refresh_lock(&self, lock: RefreshLock) -> bool {
        let released = self
            .cache
            .delete_if_value(&lock.domain.lock_key(), &lock.token)
            .await;
        if released {
            debug!("🔓 Released refresh lock for {}", lock.domain);
        } else {
            warn!(
                "Refresh lock for {} expired before release (lease {:?})",
                lock.domain, self.settings.lock_ttl
            );
        }
        released
    }

    /// Runs `work` while holding the refresh lock for `domain`. The lock is
    /// released whether `work` returns or panics.
    pub async fn with_refresh_lock<F, Fut, T>(&self, domain: &DataDomain, work: F) -> LockOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(lock) = self.acquire_refresh_lock(domain).await else {
            return LockOutcome::Contended;
        };

        let outcome = AssertUnwindSafe(work()).catch_unwind().await;
        self.release_refresh_lock(lock).await;

        match outcome {
            Ok(value) => LockOutcome::Acquired(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Forgets the last refresh of `domain`, making it due immediately.
    pub async fn reset(&self, domain: &DataDomain) {
        if self.cache.delete(&domain.timestamp_key()).await {
            info!("Reset refresh timestamp for {}", domain);
        }
    }
}
