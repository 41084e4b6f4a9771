// src/fetchers/management.rs
//! Cache-management operations exposed to the admin surface and the CLI.

use super::DashboardData;
use crate::api::RateLimitStats;
use crate::cache::CacheStats;
use crate::refresh::scheduler::ScheduledRefresh;
use crate::refresh::{DataDomain, RefreshState};
use crate::types::{DataSource, TokenRecord};
use crate::utils::Timer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHealth {
    /// Token data cached and within its interval
    Fresh,
    /// Token data cached but past its interval
    Stale,
    /// No token data to serve
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    pub domain: String,
    pub state: RefreshState,
    pub cached: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    pub next_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub last_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
    pub cache_health: CacheHealth,
    pub using_distributed_backend: bool,
    pub domains: Vec<DomainStatus>,
    pub cache_stats: CacheStats,
    pub rate_limit: RateLimitStats,
}

impl DashboardData {
    /// Refreshes every aggregate domain now, optionally clearing the whole
    /// cache first. Domains that failed or whose lock is held elsewhere are
    /// listed in the message.
    pub async fn refresh_all(&self, clear_cache: bool) -> OperationResult {
        let timer = Timer::start("Full data refresh");
        if clear_cache {
            let removed = self.cache.clear(None).await;
            info!("🧹 Cleared {} cache entries before refresh", removed);
        }

        let mut failed = Vec::new();
        for domain in DataDomain::AGGREGATE.iter() {
            let source = self.refresh_aggregate(domain).await;
            // Cache here means another process refreshed it moments ago
            if !matches!(source, DataSource::Upstream | DataSource::Cache) {
                failed.push(format!("{} ({})", domain, source));
            }
        }
        timer.finish();

        if failed.is_empty() {
            OperationResult::ok("All data refreshed successfully")
        } else {
            warn!("Refresh incomplete: {}", failed.join(", "));
            OperationResult::failed(format!("Refresh incomplete, served cached data for: {}", failed.join(", ")))
        }
    }

    /// Refreshes aggregate domains that are within the guard window of their
    /// deadline (or have nothing cached). Returns how many were refreshed.
    pub async fn refresh_if_due(&self) -> usize {
        let mut refreshed = 0;
        for domain in DataDomain::AGGREGATE.iter() {
            let near_deadline = self.coordinator.is_within_guard(domain).await;
            let missing = self.cache.get_raw(&domain.cache_key()).await.is_none();
            if !near_deadline && !missing {
                continue;
            }
            if self.refresh_aggregate(domain).await == DataSource::Upstream {
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Deletes the given keys, or everything this dashboard owns when `keys`
    /// is `None`.
    pub async fn clear_cache(&self, keys: Option<&[String]>) -> OperationResult {
        let removed = self.cache.clear(keys).await;
        match keys {
            Some(keys) if removed == 0 => {
                OperationResult::failed(format!("No cache entries found for: {}", keys.join(", ")))
            }
            Some(_) => OperationResult::ok(format!("Cleared {} cache entries", removed)),
            None => OperationResult::ok(format!("Cleared all cache ({} entries)", removed)),
        }
    }

    pub async fn get_cache_status(&self) -> CacheStatus {
        let mut domains = Vec::new();
        for domain in DataDomain::AGGREGATE.iter() {
            let timing = self.coordinator.time_until_next_refresh(domain).await;
            domains.push(DomainStatus {
                domain: domain.id(),
                state: self.coordinator.state(domain).await,
                cached: self.cache.get_raw(&domain.cache_key()).await.is_some(),
                last_refresh: timing.last_refresh_time,
                next_refresh: timing.next_refresh_time,
            });
        }

        let tokens = DataDomain::AllTokens;
        let timing = self.coordinator.time_until_next_refresh(&tokens).await;
        let has_tokens = self
            .cache
            .get::<Vec<TokenRecord>>(&tokens.cache_key())
            .await
            .is_some();
        let cache_health = if !has_tokens {
            CacheHealth::Error
        } else if timing.time_remaining.is_zero() {
            CacheHealth::Stale
        } else {
            CacheHealth::Fresh
        };

        CacheStatus {
            last_update: timing.last_refresh_time,
            next_update: timing.next_refresh_time,
            cache_health,
            using_distributed_backend: self.cache.using_distributed_backend(),
            domains,
            cache_stats: self.cache.stats(),
            rate_limit: self.http.usage().await,
        }
    }

    pub async fn list_cache_keys(&self) -> Vec<String> {
        self.cache.list_keys().await
    }
}

#[async_trait]
impl ScheduledRefresh for DashboardData {
    async fn refresh_if_due(&self) -> usize {
        DashboardData::refresh_if_due(self).await
    }
}
