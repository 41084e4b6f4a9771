// src/upstream/sheets.rs
//! Spreadsheet Scoring API: `GET {base}/spreadsheets/{id}/values/{range}?key=...`,
//! answered with `{ "values": [[header...], [row...], ...] }`.

use super::{endpoint, parse_base_url};
use crate::api::RateLimitedClient;
use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::types::TokenScore;
use log::debug;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

pub struct SheetsClient {
    http: Arc<RateLimitedClient>,
    base_url: Url,
    spreadsheet_id: Option<String>,
    range: String,
    api_key: Option<String>,
}

impl SheetsClient {
    pub fn new(
        http: Arc<RateLimitedClient>,
        base_url: &str,
        spreadsheet_id: Option<String>,
        range: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            http,
            base_url: parse_base_url("SHEETS_API_URL", base_url)?,
            spreadsheet_id,
            range: range.into(),
            api_key,
        })
    }

    pub fn from_config(http: Arc<RateLimitedClient>, config: &Config) -> Result<Self> {
        Self::new(
            http,
            &config.sheets_api_url,
            config.sheets_spreadsheet_id.clone(),
            config.sheets_range.clone(),
            config.sheets_api_key.clone(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.spreadsheet_id.is_some()
    }

    pub fn values_url(&self) -> Result<String> {
        let id = self
            .spreadsheet_id
            .as_deref()
            .ok_or_else(|| DashboardError::ConfigError("SHEETS_SPREADSHEET_ID is not set".to_string()))?;
        let query: Vec<(&str, &str)> = self.api_key.iter().map(|k| ("key", k.as_str())).collect();
        Ok(endpoint(&self.base_url, &["spreadsheets", id, "values", &self.range], &query))
    }

    pub async fn fetch_values(&self) -> Result<Vec<Vec<String>>> {
        let body: Value = self.http.fetch_json(&self.values_url()?, &[]).await?;
        let values = parse_values(&body);
        debug!("Scoring sheet returned {} rows", values.len());
        Ok(values)
    }

    pub async fn fetch_scores(&self) -> Result<Vec<TokenScore>> {
        Ok(TokenScore::from_sheet(&self.fetch_values().await?))
    }
}

/// 2-D `values` as strings. Non-string cells are rendered; a missing
/// `values` (an empty range) is an empty sheet.
pub fn parse_values(body: &Value) -> Vec<Vec<String>> {
    let Some(rows) = body.get("values").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| match cell {
                            Value::String(s) => s.clone(),
                            Value::Null => String::new(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}
