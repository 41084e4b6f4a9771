use log::{debug, error, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, Error)]
pub enum DashboardError {
    /// Transport-level failure (connect, reset, DNS)
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// Upstream answered 429 Too Many Requests
    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    /// Upstream answered with a non-2xx status other than 429
    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    /// Upstream could not produce a usable answer after retries
    #[error("Upstream Unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Payload could not be decoded at all
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Cache/Redis errors
    #[error("Cache Error: {0}")]
    CacheError(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Request timed out at the transport
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Unknown/unclassified errors
    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<anyhow::Error> for DashboardError {
    fn from(err: anyhow::Error) -> Self {
        DashboardError::Unknown(format!("Anyhow error: {}", err))
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        // Query strings carry API keys; keep only the path in messages
        let url = err
            .url()
            .map(|u| {
                let mut u = u.clone();
                u.set_query(None);
                u.to_string()
            })
            .unwrap_or_default();
        let err = err.without_url();
        let detail = if url.is_empty() {
            err.to_string()
        } else {
            format!("{} ({})", err, url)
        };

        if err.is_timeout() {
            DashboardError::TimeoutError(detail)
        } else if let Some(status) = err.status() {
            DashboardError::UpstreamStatus {
                status: status.as_u16(),
                url,
            }
        } else if err.is_decode() {
            DashboardError::ParseError(detail)
        } else {
            DashboardError::NetworkError(detail)
        }
    }
}

impl From<redis::RedisError> for DashboardError {
    fn from(err: redis::RedisError) -> Self {
        DashboardError::CacheError(format!("Redis error: {}", err))
    }
}

impl From<url::ParseError> for DashboardError {
    fn from(err: url::ParseError) -> Self {
        DashboardError::ConfigError(format!("Invalid URL: {}", err))
    }
}

impl DashboardError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            DashboardError::NetworkError(_) => true,
            DashboardError::RateLimited(_) => true,
            DashboardError::UpstreamStatus { status, .. } => {
                // Gateway hiccups recover, client errors do not
                matches!(status, 502 | 503 | 504)
            }
            DashboardError::UpstreamUnavailable(_) => true,
            DashboardError::ParseError(_) => false, // Data format issues aren't recoverable
            DashboardError::CacheError(_) => true,  // Redis might recover
            DashboardError::ConfigError(_) => false,
            DashboardError::TimeoutError(_) => true,
            DashboardError::Unknown(_) => true,
        }
    }

    /// Determines if an upstream call should be attempted again right away
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && match self {
                DashboardError::NetworkError(_) => true,
                DashboardError::RateLimited(_) => true,
                DashboardError::TimeoutError(_) => true,
                DashboardError::UpstreamStatus { .. } => true,
                DashboardError::UpstreamUnavailable(_) => false,
                DashboardError::CacheError(_) => false,
                DashboardError::Unknown(_) => false,
                _ => false,
            }
    }

    /// Categorizes error for log grouping
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            DashboardError::NetworkError(_) | DashboardError::TimeoutError(_) => {
                ErrorCategory::Network
            }
            DashboardError::RateLimited(_)
            | DashboardError::UpstreamStatus { .. }
            | DashboardError::UpstreamUnavailable(_) => ErrorCategory::Upstream,
            DashboardError::ParseError(_) => ErrorCategory::Data,
            DashboardError::CacheError(_) => ErrorCategory::Infrastructure,
            DashboardError::ConfigError(_) => ErrorCategory::Configuration,
            DashboardError::Unknown(_) => ErrorCategory::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Upstream,
    Data,
    Infrastructure,
    Configuration,
    Critical,
}

/// Retry policy with exponential backoff.
///
/// The wait preceding attempt `n + 1` is `base_delay * 2^n`, capped at `max_delay`,
/// so consecutive failures wait `2d`, `4d`, `8d`...
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delay to wait before the attempt with zero-based index `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let factor = 2_u128.checked_pow(attempt).unwrap_or(u128::MAX);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64);

        debug!("Retry attempt {}: delay = {:?}", attempt + 1, delay);
        delay
    }

    /// Execute operation with retry logic.
    ///
    /// Non-retryable errors are returned immediately; after `max_attempts`
    /// retryable failures the last error is returned.
    pub async fn execute<F, T, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;
        let attempts = self.max_attempts.max(1);

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.delay_for_attempt(attempt);
                sleep(delay).await;
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("{} succeeded after {} retries", label, attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.should_retry() {
                        warn!("{}: non-retryable error on attempt {}: {}", label, attempt + 1, e);
                        return Err(e);
                    }

                    if attempt + 1 < attempts {
                        warn!(
                            "🔄 {} attempt {}/{} failed: {} (retrying in {:?})",
                            label,
                            attempt + 1,
                            attempts,
                            e,
                            self.delay_for_attempt(attempt + 1)
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        error!("{}: all {} attempts failed", label, attempts);
        Err(last_error
            .unwrap_or_else(|| DashboardError::UpstreamUnavailable("Max retries exceeded".to_string())))
    }
}

// Convenience type aliases
pub type Result<T> = std::result::Result<T, DashboardError>;
