// src/fetchers/mod.rs
//! Domain data fetchers.
//!
//! Every fetcher follows the same policy:
//! 1. not due and cached: serve the cache, no upstream call
//! 2. due: try the domain's refresh lock; if another process holds it, serve
//!    whatever is cached without waiting
//! 3. lock held: unless another holder refreshed the domain since this call
//!    began, fetch upstream, write the cache, record the refresh time
//! 4. upstream failure: serve the last cached value, or the domain default
//!
//! Fetchers never fail. The path taken is reported in `Fetched::source`.

pub mod management;

pub use management::{CacheHealth, CacheStatus, DomainStatus, OperationResult};

use crate::api::{HttpTransport, RateLimitedClient, ReqwestTransport};
use crate::cache::CacheClient;
use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::refresh::{DataDomain, LockOutcome, RefreshCoordinator, RefreshLock, RefreshSettings};
use crate::types::{sort_by_market_cap, DataSource, Fetched, MarketStats, PairData, TokenDetail, TokenRecord, TokenScore};
use crate::upstream::{AnalyticsClient, DexClient, SheetsClient};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Query ids and sizing for the upstream sources.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub tokens_query_id: Option<String>,
    pub market_stats_query_id: Option<String>,
    pub dex_batch_size: usize,
    /// TTL of cached domain values; long enough that stale data stays servable.
    pub cache_value_ttl: Duration,
}

impl From<&Config> for SourceSettings {
    fn from(config: &Config) -> Self {
        Self {
            tokens_query_id: config.tokens_query_id.clone(),
            market_stats_query_id: config.market_stats_query_id.clone(),
            dex_batch_size: config.dex_batch_size,
            cache_value_ttl: config.cache_value_ttl(),
        }
    }
}

/// The dashboard's data service, constructed once at startup and shared.
pub struct DashboardData {
    cache: Arc<CacheClient>,
    coordinator: RefreshCoordinator,
    http: Arc<RateLimitedClient>,
    analytics: AnalyticsClient,
    dex: DexClient,
    sheets: SheetsClient,
    sources: SourceSettings,
}

impl DashboardData {
    /// Wires the service over an existing cache and transport.
    pub fn new(cache: Arc<CacheClient>, transport: Arc<dyn HttpTransport>, config: &Config) -> Result<Self> {
        let http = Arc::new(RateLimitedClient::from_config("upstream", transport, config));
        Ok(Self {
            coordinator: RefreshCoordinator::new(cache.clone(), RefreshSettings::from(config)),
            analytics: AnalyticsClient::from_config(http.clone(), config)?,
            dex: DexClient::from_config(http.clone(), config)?,
            sheets: SheetsClient::from_config(http.clone(), config)?,
            sources: SourceSettings::from(config),
            cache,
            http,
        })
    }

    /// Production wiring: Redis (or the memory fallback) and a reqwest transport.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let cache = Arc::new(CacheClient::connect(config.redis_url.as_deref()).await);
        let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(config.http_timeout_secs))?);
        Self::new(cache, transport, config)
    }

    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn http(&self) -> &RateLimitedClient {
        &self.http
    }

    // =================================================================================
    // DOMAIN FETCHERS
    // =================================================================================

    /// Aggregate token list, sorted by descending market cap.
    pub async fn get_all_tokens(&self) -> Fetched<Vec<TokenRecord>> {
        self.get_or_refresh(&DataDomain::AllTokens, || self.fetch_tokens_upstream(), Vec::new)
            .await
    }

    pub async fn get_market_stats(&self) -> Fetched<MarketStats> {
        self.get_or_refresh(&DataDomain::MarketStats, || self.fetch_market_stats_upstream(), MarketStats::default)
            .await
    }

    pub async fn get_token_scores(&self) -> Fetched<Vec<TokenScore>> {
        self.get_or_refresh(&DataDomain::TokenScores, || self.sheets.fetch_scores(), Vec::new)
            .await
    }

    pub async fn get_token_detail(&self, address: &str) -> Fetched<TokenDetail> {
        let domain = DataDomain::TokenDetail(address.to_string());
        self.get_or_refresh(&domain, || self.fetch_token_detail_upstream(address), || TokenDetail::empty(address))
            .await
    }

    /// A single DEX pair; `None` when neither the API nor the cache knows it.
    pub async fn get_pair(&self, pair_address: &str) -> Fetched<Option<PairData>> {
        let domain = DataDomain::Pair(pair_address.to_string());
        self.get_or_refresh(&domain, || self.dex.fetch_pair(pair_address), || None)
            .await
    }

    /// Details for many tokens in as few upstream calls as possible.
    ///
    /// Fresh cached addresses are served directly. Due addresses whose lock
    /// this process takes are fetched in batches; the rest fall back to the
    /// cache. An address maps to `None` only when its batch failed (or its
    /// lock was contended) and nothing is cached for it.
    pub async fn get_token_details(&self, addresses: &[String]) -> HashMap<String, Option<Fetched<TokenDetail>>> {
        let started = Utc::now();
        let mut results: HashMap<String, Option<Fetched<TokenDetail>>> = HashMap::with_capacity(addresses.len());
        let mut locks: Vec<(String, RefreshLock)> = Vec::new();

        for address in addresses {
            if results.contains_key(address) || locks.iter().any(|(a, _)| a == address) {
                continue;
            }
            let domain = DataDomain::TokenDetail(address.clone());
            if !self.coordinator.is_refresh_due(&domain).await {
                if let Some(detail) = self.cache.get::<TokenDetail>(&domain.cache_key()).await {
                    results.insert(address.clone(), Some(Fetched::new(detail, DataSource::Cache)));
                    continue;
                }
            }
            match self.coordinator.acquire_refresh_lock(&domain).await {
                Some(lock) => match self.refreshed_elsewhere::<TokenDetail>(&domain, started).await {
                    Some(detail) => {
                        self.coordinator.release_refresh_lock(lock).await;
                        results.insert(address.clone(), Some(Fetched::new(detail, DataSource::Cache)));
                    }
                    None => locks.push((address.clone(), lock)),
                },
                None => {
                    let cached = self.cached_fallback::<TokenDetail>(&domain).await;
                    results.insert(address.clone(), cached);
                }
            }
        }

        if locks.is_empty() {
            return results;
        }

        let due: Vec<String> = locks.iter().map(|(address, _)| address.clone()).collect();
        debug!("Fetching {} token details in batches of {}", due.len(), self.sources.dex_batch_size);
        let fetched = AssertUnwindSafe(self.store_token_details(&due)).catch_unwind().await;

        for (_, lock) in locks {
            self.coordinator.release_refresh_lock(lock).await;
        }

        let mut fetched = match fetched {
            Ok(fetched) => fetched,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        for address in due {
            let entry = match fetched.remove(&address).flatten() {
                Some(detail) => Some(Fetched::new(detail, DataSource::Upstream)),
                None => {
                    let domain = DataDomain::TokenDetail(address.clone());
                    self.cached_fallback::<TokenDetail>(&domain).await
                }
            };
            results.insert(address, entry);
        }
        results
    }

    async fn store_token_details(&self, addresses: &[String]) -> HashMap<String, Option<TokenDetail>> {
        let details = self
            .dex
            .fetch_token_details(addresses, self.sources.dex_batch_size)
            .await;
        for (address, detail) in &details {
            if let Some(detail) = detail {
                let domain = DataDomain::TokenDetail(address.clone());
                self.cache
                    .set(&domain.cache_key(), detail, Some(self.sources.cache_value_ttl))
                    .await;
                self.coordinator.record_refresh(&domain).await;
            }
        }
        details
    }

    // =================================================================================
    // REFRESH POLICY
    // =================================================================================

    async fn get_or_refresh<T, F, Fut, D>(&self, domain: &DataDomain, fetch: F, default: D) -> Fetched<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        D: FnOnce() -> T,
    {
        let started = Utc::now();
        if !self.coordinator.is_refresh_due(domain).await {
            if let Some(value) = self.cache.get::<T>(&domain.cache_key()).await {
                return Fetched::new(value, DataSource::Cache);
            }
            // Timestamp without data: the cache was cleared, refetch.
            debug!("{} not due but nothing cached", domain);
        }
        self.refresh_domain(domain, started, fetch, default).await
    }

    /// Fetches `domain` under its refresh lock regardless of its interval.
    /// If another holder refreshed it after `started`, its cached value is
    /// served instead of fetching again.
    async fn refresh_domain<T, F, Fut, D>(
        &self,
        domain: &DataDomain,
        started: DateTime<Utc>,
        fetch: F,
        default: D,
    ) -> Fetched<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        D: FnOnce() -> T,
    {
        let outcome = self
            .coordinator
            .with_refresh_lock(domain, || async {
                if let Some(value) = self.refreshed_elsewhere::<T>(domain, started).await {
                    return Ok::<Fetched<T>, DashboardError>(Fetched::new(value, DataSource::Cache));
                }
                let value = fetch().await?;
                self.cache
                    .set(&domain.cache_key(), &value, Some(self.sources.cache_value_ttl))
                    .await;
                self.coordinator.record_refresh(domain).await;
                Ok::<Fetched<T>, DashboardError>(Fetched::new(value, DataSource::Upstream))
            })
            .await;

        let fallback = match outcome {
            LockOutcome::Acquired(Ok(fetched)) => {
                if fetched.source == DataSource::Upstream {
                    info!("✅ Refreshed {} from upstream", domain);
                }
                return fetched;
            }
            LockOutcome::Acquired(Err(e)) => {
                warn!(
                    "❌ Refresh of {} failed ({:?}), serving cached data: {}",
                    domain,
                    e.categorize(),
                    e
                );
                self.cached_fallback::<T>(domain).await
            }
            LockOutcome::Contended => {
                debug!("{} is being refreshed elsewhere, serving cached data", domain);
                self.cached_fallback::<T>(domain).await
            }
        };
        fallback.unwrap_or_else(|| Fetched::new(default(), DataSource::Default))
    }

    /// The cached value of `domain` if another holder refreshed it after
    /// `started`. Checked after winning the lock: the caller's due check may
    /// have read the timestamp just before that refresh was recorded.
    async fn refreshed_elsewhere<T: DeserializeOwned>(&self, domain: &DataDomain, started: DateTime<Utc>) -> Option<T> {
        if !self.coordinator.refreshed_since(domain, started).await {
            return None;
        }
        let value = self.cache.get::<T>(&domain.cache_key()).await?;
        debug!("{} was refreshed elsewhere while waiting for its lock", domain);
        Some(value)
    }

    async fn cached_fallback<T: DeserializeOwned>(&self, domain: &DataDomain) -> Option<Fetched<T>> {
        self.cache
            .get::<T>(&domain.cache_key())
            .await
            .map(|value| Fetched::new(value, DataSource::StaleCache))
    }

    /// Forces a refresh of one aggregate domain, returning where the
    /// resulting value came from.
    pub(crate) async fn refresh_aggregate(&self, domain: &DataDomain) -> DataSource {
        let started = Utc::now();
        match domain {
            DataDomain::AllTokens => {
                self.refresh_domain(domain, started, || self.fetch_tokens_upstream(), Vec::new)
                    .await
                    .source
            }
            DataDomain::MarketStats => {
                self.refresh_domain(domain, started, || self.fetch_market_stats_upstream(), MarketStats::default)
                    .await
                    .source
            }
            DataDomain::TokenScores => {
                self.refresh_domain(domain, started, || self.sheets.fetch_scores(), Vec::new)
                    .await
                    .source
            }
            DataDomain::TokenDetail(address) => {
                self.refresh_domain(domain, started, || self.fetch_token_detail_upstream(address), || TokenDetail::empty(address))
                    .await
                    .source
            }
            DataDomain::Pair(pair) => {
                self.refresh_domain(domain, started, || self.dex.fetch_pair(pair), || None)
                    .await
                    .source
            }
        }
    }

    // =================================================================================
    // UPSTREAM TRANSFORMS
    // =================================================================================

    async fn fetch_tokens_upstream(&self) -> Result<Vec<TokenRecord>> {
        let query_id = self
            .sources
            .tokens_query_id
            .as_deref()
            .ok_or_else(|| DashboardError::ConfigError("TOKENS_QUERY_ID is not set".to_string()))?;
        let mut tokens = self.analytics.fetch_tokens(query_id).await?;
        sort_by_market_cap(&mut tokens);
        Ok(tokens)
    }

    /// Market totals from their own query, or derived from the token list
    /// when no query is configured.
    async fn fetch_market_stats_upstream(&self) -> Result<MarketStats> {
        if let Some(query_id) = self.sources.market_stats_query_id.as_deref() {
            return self.analytics.fetch_market_stats(query_id).await;
        }
        let tokens = self.get_all_tokens().await;
        if tokens.is_fallback() {
            // Stats are only recorded as fresh when the list they come from is.
            return Err(DashboardError::UpstreamUnavailable(format!(
                "token list unavailable ({:?}), cannot derive market stats",
                tokens.source
            )));
        }
        Ok(MarketStats::from_tokens(&tokens.value))
    }

    async fn fetch_token_detail_upstream(&self, address: &str) -> Result<TokenDetail> {
        Ok(self
            .dex
            .fetch_token(address)
            .await?
            .unwrap_or_else(|| TokenDetail::empty(address)))
    }
}
