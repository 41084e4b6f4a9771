// src/api/client.rs
//! Shared async HTTP client for upstream APIs: rolling-window throttling,
//! exponential backoff on throttling and transient failures, and batching of
//! multi-item requests.

use super::rate_limiter::{RateLimitConfig, RateLimitStats, SlidingWindowRateLimiter};
use super::transport::{HttpResponse, HttpTransport};
use crate::config::Config;
use crate::error::{DashboardError, Result, RetryPolicy};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Per-item outcome of `fetch_batch`: the response of the item's batch, or
/// `None` when that batch failed.
pub type BatchResults = HashMap<String, Option<Arc<HttpResponse>>>;

/// Drops the query string so API keys passed as parameters never reach the logs.
pub fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

pub struct RateLimitedClient {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<SlidingWindowRateLimiter>,
    retry: RetryPolicy,
    batch_pause: Duration,
}

impl RateLimitedClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<SlidingWindowRateLimiter>,
        retry: RetryPolicy,
        batch_pause: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            batch_pause,
        }
    }

    /// Client with limits taken from configuration, sharing one limiter for
    /// every upstream reached through `transport`.
    pub fn from_config(name: &str, transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        let limiter = SlidingWindowRateLimiter::new(
            name,
            RateLimitConfig {
                requests_per_minute: config.rate_limit_per_minute,
                window: Duration::from_secs(60),
                wait_buffer: Duration::from_millis(config.rate_limit_buffer_ms),
            },
        );
        let retry = RetryPolicy::new(
            config.api_max_retries,
            Duration::from_millis(config.api_initial_backoff_ms),
            Duration::from_millis(config.api_max_backoff_ms),
        );
        Self::new(transport, Arc::new(limiter), retry, config.batch_pause())
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn usage(&self) -> RateLimitStats {
        self.limiter.usage().await
    }

    fn check_status(url: &str, response: HttpResponse) -> Result<HttpResponse> {
        match response.status {
            s if (200..300).contains(&s) => Ok(response),
            429 => Err(DashboardError::RateLimited(redact_url(url).to_string())),
            status => Err(DashboardError::UpstreamStatus {
                status,
                url: redact_url(url).to_string(),
            }),
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<HttpResponse> {
        self.fetch_with_headers(url, &[]).await
    }

    /// GETs `url`, waiting for a rate-limit slot before every attempt.
    /// Throttling (429), gateway errors and transport failures are retried
    /// with exponential backoff; the last error propagates once attempts run out.
    pub async fn fetch_with_headers(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let transport = &self.transport;
        let limiter = &self.limiter;
        self.retry
            .execute(redact_url(url), || async move {
                limiter.acquire().await;
                let response = transport.get(url, headers).await?;
                Self::check_status(url, response)
            })
            .await
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str, headers: &[(String, String)]) -> Result<T> {
        self.fetch_with_headers(url, headers).await?.json()
    }

    /// Splits `items` into groups of `batch_size` and issues one request per
    /// group, pausing between groups. A failed group maps each of its items
    /// to `None`; remaining groups still run.
    pub async fn fetch_batch<F>(
        &self,
        items: &[String],
        batch_size: usize,
        headers: &[(String, String)],
        url_for: F,
    ) -> BatchResults
    where
        F: Fn(&[String]) -> String,
    {
        let mut seen = HashSet::new();
        let unique: Vec<String> = items.iter().filter(|i| seen.insert(i.as_str())).cloned().collect();
        let batch_size = batch_size.max(1);
        let batch_count = unique.len().div_ceil(batch_size);
        let mut results = BatchResults::with_capacity(unique.len());

        for (index, batch) in unique.chunks(batch_size).enumerate() {
            if index > 0 && !self.batch_pause.is_zero() {
                sleep(self.batch_pause).await;
            }

            let url = url_for(batch);
            match self.fetch_with_headers(&url, headers).await {
                Ok(response) => {
                    debug!("Batch {}/{} fetched ({} items)", index + 1, batch_count, batch.len());
                    let response = Arc::new(response);
                    for item in batch {
                        results.insert(item.clone(), Some(response.clone()));
                    }
                }
                Err(e) => {
                    warn!(
                        "Batch {}/{} failed, marking {} items unavailable: {}",
                        index + 1,
                        batch_count,
                        batch.len(),
                        e
                    );
                    for item in batch {
                        results.insert(item.clone(), None);
                    }
                }
            }
        }

        let failed = results.values().filter(|r| r.is_none()).count();
        info!(
            "Batch fetch complete: {} items in {} batches, {} unavailable",
            unique.len(),
            batch_count,
            failed
        );
        results
    }
}
