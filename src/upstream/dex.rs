// src/upstream/dex.rs
//! DEX Data API: `GET {base}/tokens/{chain}/{a,b,...}` and
//! `GET {base}/pairs/{chain}/{pair}`, both answered with `{ "pairs": [...] }`.

use super::{endpoint, parse_base_url};
use crate::api::{HttpResponse, RateLimitedClient};
use crate::config::Config;
use crate::error::Result;
use crate::types::{PairData, TokenDetail};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

pub struct DexClient {
    http: Arc<RateLimitedClient>,
    base_url: Url,
    chain_id: String,
}

impl DexClient {
    pub fn new(http: Arc<RateLimitedClient>, base_url: &str, chain_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http,
            base_url: parse_base_url("DEX_API_URL", base_url)?,
            chain_id: chain_id.into(),
        })
    }

    pub fn from_config(http: Arc<RateLimitedClient>, config: &Config) -> Result<Self> {
        Self::new(http, &config.dex_api_url, config.dex_chain_id.clone())
    }

    pub fn tokens_url(&self, addresses: &[String]) -> String {
        endpoint(&self.base_url, &["tokens", &self.chain_id, &addresses.join(",")], &[])
    }

    pub fn pair_url(&self, pair_address: &str) -> String {
        endpoint(&self.base_url, &["pairs", &self.chain_id, pair_address], &[])
    }

    /// Summary of one token across its pairs; `None` when the API lists no pair for it.
    pub async fn fetch_token(&self, address: &str) -> Result<Option<TokenDetail>> {
        let body: Value = self.http.fetch_json(&self.tokens_url(&[address.to_string()]), &[]).await?;
        Ok(TokenDetail::from_pairs(address, &parse_pairs(&body)))
    }

    pub async fn fetch_pair(&self, pair_address: &str) -> Result<Option<PairData>> {
        let body: Value = self.http.fetch_json(&self.pair_url(pair_address), &[]).await?;
        let pairs = parse_pairs(&body);
        Ok(pairs
            .iter()
            .find(|p| p.pair_address == pair_address)
            .or_else(|| pairs.first())
            .cloned())
    }

    /// Fetches details for many tokens, `batch_size` addresses per request.
    /// Addresses whose batch failed map to `None`; addresses the API has no
    /// pairs for map to an empty detail.
    pub async fn fetch_token_details(
        &self,
        addresses: &[String],
        batch_size: usize,
    ) -> HashMap<String, Option<TokenDetail>> {
        let responses = self
            .http
            .fetch_batch(addresses, batch_size, &[], |batch| self.tokens_url(batch))
            .await;

        responses
            .into_iter()
            .map(|(address, response)| {
                let detail = response.and_then(|response| detail_from_response(&address, &response));
                (address, detail)
            })
            .collect()
    }
}

fn detail_from_response(address: &str, response: &HttpResponse) -> Option<TokenDetail> {
    match response.json::<Value>() {
        Ok(body) => Some(
            TokenDetail::from_pairs(address, &parse_pairs(&body)).unwrap_or_else(|| TokenDetail::empty(address)),
        ),
        Err(e) => {
            warn!("Discarding unparseable DEX response for {}: {}", address, e);
            None
        }
    }
}

/// Elements of `pairs`. The API answers unknown tokens with `"pairs": null`,
/// which is an empty list, not an error.
pub fn parse_pairs(body: &Value) -> Vec<PairData> {
    let pairs: Vec<PairData> = body
        .get("pairs")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|v| v.is_object()).map(PairData::from_value).collect())
        .unwrap_or_default();
    debug!("Parsed {} DEX pairs", pairs.len());
    pairs
}
