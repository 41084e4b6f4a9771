// src/upstream/mod.rs
//! Clients for the three upstream data sources. Each one builds endpoint URLs,
//! sends them through the shared `RateLimitedClient` and turns the loosely
//! typed payload into the value objects in `crate::types`.

pub mod analytics;
pub mod dex;
pub mod sheets;

pub use analytics::AnalyticsClient;
pub use dex::DexClient;
pub use sheets::SheetsClient;

use crate::error::{DashboardError, Result};
use url::Url;

/// Parses a base URL that further path segments can be appended to.
pub(crate) fn parse_base_url(name: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| DashboardError::ConfigError(format!("{}: {}", name, e)))?;
    if url.cannot_be_a_base() {
        return Err(DashboardError::ConfigError(format!("{}: {} cannot take a path", name, raw)));
    }
    Ok(url)
}

/// `base` with `segments` appended (each percent-encoded as one path
/// segment) and `query` pairs added.
pub(crate) fn endpoint(base: &Url, segments: &[&str], query: &[(&str, &str)]) -> String {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    url.to_string()
}
