// src/api/mod.rs
//! Outbound HTTP plumbing shared by every upstream client:
//! - rolling-window rate limiting
//! - retry with exponential backoff
//! - batched multi-item requests

pub mod client;
pub mod rate_limiter;
pub mod transport;

pub use client::{redact_url, BatchResults, RateLimitedClient};
pub use rate_limiter::{RateLimitConfig, RateLimitStats, SlidingWindowRateLimiter};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
