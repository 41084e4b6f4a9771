// src/api/rate_limiter.rs
//! Rolling-window rate limiter for outbound upstream calls.
//!
//! Keeps the timestamps of admitted calls from the trailing window. A call is
//! admitted only while fewer than `requests_per_minute` timestamps remain in
//! the window; otherwise the caller sleeps until the oldest one leaves the
//! window (plus a small buffer) and checks again.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub window: Duration,
    /// Extra wait added once the window is full
    pub wait_buffer: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            window: Duration::from_secs(60),
            wait_buffer: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    config: RateLimitConfig,
    request_history: Mutex<VecDeque<Instant>>,
    throttled_waits: AtomicU64,
    provider_name: String,
}

impl SlidingWindowRateLimiter {
    pub fn new(provider_name: impl Into<String>, config: RateLimitConfig) -> Self {
        let provider_name = provider_name.into();
        info!(
            "🚦 Initializing rate limiter for {}: {} req per {:?}",
            provider_name, config.requests_per_minute, config.window
        );
        Self {
            config,
            request_history: Mutex::new(VecDeque::new()),
            throttled_waits: AtomicU64::new(0),
            provider_name,
        }
    }

    fn purge(&self, history: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = history.front() {
            if now.duration_since(*front) >= self.config.window {
                history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Waits until the window admits one more call, then records it.
    pub async fn acquire(&self) {
        let ceiling = self.config.requests_per_minute.max(1) as usize;
        loop {
            let wait = {
                let mut history = self.request_history.lock().await;
                let now = Instant::now();
                self.purge(&mut history, now);

                if history.len() < ceiling {
                    history.push_back(now);
                    debug!(
                        "📊 {} call admitted ({}/{} in window)",
                        self.provider_name,
                        history.len(),
                        ceiling
                    );
                    return;
                }

                let oldest = history.front().copied().unwrap_or(now);
                (oldest + self.config.window + self.config.wait_buffer).saturating_duration_since(now)
            };

            self.throttled_waits.fetch_add(1, Ordering::Relaxed);
            warn!(
                "⏳ {} rate limit reached ({} per {:?}), waiting {:?}",
                self.provider_name, ceiling, self.config.window, wait
            );
            sleep(wait).await;
        }
    }

    /// Get current usage statistics
    pub async fn usage(&self) -> RateLimitStats {
        let mut history = self.request_history.lock().await;
        self.purge(&mut history, Instant::now());
        RateLimitStats {
            provider_name: self.provider_name.clone(),
            requests_in_window: history.len() as u32,
            limit: self.config.requests_per_minute,
            window_secs: self.config.window.as_secs(),
            throttled_waits: self.throttled_waits.load(Ordering::Relaxed),
        }
    }
}

/// Rate limiting statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub provider_name: String,
    pub requests_in_window: u32,
    pub limit: u32,
    pub window_secs: u64,
    pub throttled_waits: u64,
}

impl std::fmt::Display for RateLimitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} API: {}/{} per {}s, throttled waits: {}",
            self.provider_name, self.requests_in_window, self.limit, self.window_secs, self.throttled_waits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(ceiling: u32) -> SlidingWindowRateLimiter {
        SlidingWindowRateLimiter::new(
            "test",
            RateLimitConfig {
                requests_per_minute: ceiling,
                ..RateLimitConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_over_ceiling_waits_for_window() {
        let limiter = limiter(3);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        // oldest call leaves the 60s window, plus the 1s buffer
        assert!(start.elapsed() >= Duration::from_secs(61));
        assert!(start.elapsed() < Duration::from_secs(62));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_never_exceeds_ceiling() {
        let limiter = Arc::new(limiter(5));
        let admitted = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                admitted.lock().await.push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let admitted = admitted.lock().await;
        assert_eq!(admitted.len(), 12);
        for at in admitted.iter() {
            let in_window = admitted
                .iter()
                .filter(|other| **other <= *at && at.duration_since(**other) < Duration::from_secs(60))
                .count();
            assert!(in_window <= 5, "{} calls inside one window", in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_stats() {
        let limiter = limiter(2);
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        let stats = limiter.usage().await;
        assert_eq!(stats.provider_name, "test");
        assert_eq!(stats.throttled_waits, 1);
        assert!(stats.requests_in_window <= 2);
        assert!(stats.to_string().contains("per 60s"));
    }
}
