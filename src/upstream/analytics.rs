// src/upstream/analytics.rs
//! Analytics Query API: `GET {base}/query/{id}/results?limit=N`, answered
//! with `{ "result": { "rows": [...] } }`.

use super::{endpoint, parse_base_url};
use crate::api::RateLimitedClient;
use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::types::{MarketStats, TokenRecord};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

pub struct AnalyticsClient {
    http: Arc<RateLimitedClient>,
    base_url: Url,
    api_key: Option<String>,
    api_key_header: String,
    row_limit: u32,
}

impl AnalyticsClient {
    pub fn new(
        http: Arc<RateLimitedClient>,
        base_url: &str,
        api_key: Option<String>,
        api_key_header: impl Into<String>,
        row_limit: u32,
    ) -> Result<Self> {
        Ok(Self {
            http,
            base_url: parse_base_url("ANALYTICS_API_URL", base_url)?,
            api_key,
            api_key_header: api_key_header.into(),
            row_limit,
        })
    }

    pub fn from_config(http: Arc<RateLimitedClient>, config: &Config) -> Result<Self> {
        Self::new(
            http,
            &config.analytics_api_url,
            config.analytics_api_key.clone(),
            config.analytics_api_key_header.clone(),
            config.analytics_row_limit,
        )
    }

    pub fn results_url(&self, query_id: &str) -> String {
        let limit = self.row_limit.to_string();
        endpoint(&self.base_url, &["query", query_id, "results"], &[("limit", &limit)])
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.api_key
            .iter()
            .map(|key| (self.api_key_header.clone(), key.clone()))
            .collect()
    }

    /// Raw rows of a query's latest result set.
    pub async fn fetch_rows(&self, query_id: &str) -> Result<Vec<Value>> {
        let body: Value = self.http.fetch_json(&self.results_url(query_id), &self.headers()).await?;
        let rows = parse_rows(&body)?;
        debug!("Analytics query {} returned {} rows", query_id, rows.len());
        Ok(rows)
    }

    pub async fn fetch_tokens(&self, query_id: &str) -> Result<Vec<TokenRecord>> {
        let rows = self.fetch_rows(query_id).await?;
        let tokens: Vec<TokenRecord> = rows.iter().filter_map(TokenRecord::from_analytics_row).collect();
        if tokens.len() < rows.len() {
            warn!(
                "Analytics query {}: skipped {} non-object rows",
                query_id,
                rows.len() - tokens.len()
            );
        }
        Ok(tokens)
    }

    /// Market totals from the first row of `query_id`'s result set.
    pub async fn fetch_market_stats(&self, query_id: &str) -> Result<MarketStats> {
        let rows = self.fetch_rows(query_id).await?;
        rows.first()
            .map(MarketStats::from_analytics_row)
            .ok_or_else(|| DashboardError::ParseError(format!("analytics query {} returned no rows", query_id)))
    }
}

/// Extracts `result.rows`. A missing or non-array `rows` is a malformed payload.
pub fn parse_rows(body: &Value) -> Result<Vec<Value>> {
    body.pointer("/result/rows")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| DashboardError::ParseError("analytics response has no result.rows array".to_string()))
}
