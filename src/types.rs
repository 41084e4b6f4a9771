// src/types.rs
//! Value objects produced by the fetchers and stored in the cache.
//!
//! Upstream payloads are loosely typed. Every constructor here defaults a
//! missing or malformed field (zero, empty string, "Unknown") instead of
//! rejecting the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const UNKNOWN: &str = "Unknown";

// =====================================================================================
// FIELD HELPERS
// =====================================================================================

/// Numeric value of `v`, accepting JSON numbers and numeric strings
/// (thousands separators and a leading `$` are tolerated).
pub fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',' && *c != '_')
                .collect();
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First of `keys` present in `row` as a non-empty string.
fn field_str(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| row.get(*k).and_then(value_to_string))
}

fn field_f64(row: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|k| row.get(*k).and_then(value_to_f64))
        .unwrap_or(0.0)
}

fn field_u64(row: &Value, keys: &[&str]) -> u64 {
    let value = field_f64(row, keys);
    if value.is_sign_negative() {
        0
    } else {
        value as u64
    }
}

fn num_at(v: &Value, pointer: &str) -> f64 {
    v.pointer(pointer).and_then(value_to_f64).unwrap_or(0.0)
}

fn str_at(v: &Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(value_to_string)
        .unwrap_or_default()
}

// =====================================================================================
// ANALYTICS DOMAINS
// =====================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub symbol: String,
    pub name: String,
    pub address: String,
    pub price_usd: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub holders: u64,
    pub price_change_24h: f64,
}

impl TokenRecord {
    /// Builds a record from one analytics row. Non-object rows yield `None`.
    pub fn from_analytics_row(row: &Value) -> Option<Self> {
        if !row.is_object() {
            return None;
        }
        let symbol = field_str(row, &["symbol", "token_symbol", "ticker"])
            .unwrap_or_else(|| UNKNOWN.to_string());
        Some(Self {
            name: field_str(row, &["name", "token_name"]).unwrap_or_else(|| symbol.clone()),
            symbol,
            address: field_str(row, &["address", "token_address", "contract_address", "mint"])
                .unwrap_or_default(),
            price_usd: field_f64(row, &["price_usd", "price", "latest_price"]),
            market_cap: field_f64(row, &["market_cap", "marketcap", "mcap", "market_cap_usd"]),
            volume_24h: field_f64(row, &["volume_24h", "volume", "volume_usd", "daily_volume"]),
            holders: field_u64(row, &["holders", "holder_count", "num_holders"]),
            price_change_24h: field_f64(row, &["price_change_24h", "change_24h"]),
        })
    }
}

/// Sorts by descending market cap; ties keep symbol order so the canonical
/// order is stable across refreshes.
pub fn sort_by_market_cap(tokens: &mut [TokenRecord]) {
    tokens.sort_by(|a, b| {
        b.market_cap
            .total_cmp(&a.market_cap)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub total_market_cap: f64,
    pub total_volume_24h: f64,
    pub total_holders: u64,
    pub token_count: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MarketStats {
    pub fn from_tokens(tokens: &[TokenRecord]) -> Self {
        Self {
            total_market_cap: tokens.iter().map(|t| t.market_cap).sum(),
            total_volume_24h: tokens.iter().map(|t| t.volume_24h).sum(),
            total_holders: tokens.iter().map(|t| t.holders).sum(),
            token_count: tokens.len() as u64,
            updated_at: Some(Utc::now()),
        }
    }

    pub fn from_analytics_row(row: &Value) -> Self {
        Self {
            total_market_cap: field_f64(row, &["total_market_cap", "market_cap", "total_mcap"]),
            total_volume_24h: field_f64(row, &["total_volume_24h", "total_volume", "volume_24h"]),
            total_holders: field_u64(row, &["total_holders", "holders", "unique_holders"]),
            token_count: field_u64(row, &["token_count", "tokens", "num_tokens"]),
            updated_at: Some(Utc::now()),
        }
    }
}

// =====================================================================================
// DEX DOMAINS
// =====================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairToken {
    pub address: String,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairData {
    pub chain_id: String,
    pub dex_id: String,
    pub url: String,
    pub pair_address: String,
    pub base_token: PairToken,
    pub quote_token: PairToken,
    pub price_native: f64,
    pub price_usd: f64,
    pub buys_24h: u64,
    pub sells_24h: u64,
    pub volume_24h: f64,
    pub price_change_24h: f64,
    pub liquidity_usd: f64,
    pub fdv: f64,
    pub market_cap: f64,
    pub pair_created_at: Option<i64>,
}

impl PairData {
    /// Builds a pair from one element of a DEX API `pairs` array.
    pub fn from_value(v: &Value) -> Self {
        let token = |prefix: &str| PairToken {
            address: str_at(v, &format!("/{}/address", prefix)),
            name: v
                .pointer(&format!("/{}/name", prefix))
                .and_then(value_to_string)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            symbol: v
                .pointer(&format!("/{}/symbol", prefix))
                .and_then(value_to_string)
                .unwrap_or_else(|| UNKNOWN.to_string()),
        };
        Self {
            chain_id: str_at(v, "/chainId"),
            dex_id: str_at(v, "/dexId"),
            url: str_at(v, "/url"),
            pair_address: str_at(v, "/pairAddress"),
            base_token: token("baseToken"),
            quote_token: token("quoteToken"),
            price_native: num_at(v, "/priceNative"),
            price_usd: num_at(v, "/priceUsd"),
            buys_24h: num_at(v, "/txns/h24/buys").max(0.0) as u64,
            sells_24h: num_at(v, "/txns/h24/sells").max(0.0) as u64,
            volume_24h: num_at(v, "/volume/h24"),
            price_change_24h: num_at(v, "/priceChange/h24"),
            liquidity_usd: num_at(v, "/liquidity/usd"),
            fdv: num_at(v, "/fdv"),
            market_cap: num_at(v, "/marketCap"),
            pair_created_at: v.pointer("/pairCreatedAt").and_then(Value::as_i64),
        }
    }

    /// True when `address` is this pair's base or quote token.
    pub fn involves(&self, address: &str) -> bool {
        self.base_token.address == address || self.quote_token.address == address
    }
}

/// DEX view of a single token, summarised across its pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenDetail {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub price_change_24h: f64,
    pub market_cap: f64,
    pub buys_24h: u64,
    pub sells_24h: u64,
    pub pairs: Vec<PairData>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl TokenDetail {
    pub fn empty(address: &str) -> Self {
        Self {
            address: address.to_string(),
            symbol: UNKNOWN.to_string(),
            name: UNKNOWN.to_string(),
            ..Default::default()
        }
    }

    /// Summarises the pairs that involve `address`. Price and identity come
    /// from the deepest pair; volume and transaction counts are summed.
    /// Returns `None` when no pair involves the token.
    pub fn from_pairs(address: &str, pairs: &[PairData]) -> Option<Self> {
        let mut relevant: Vec<PairData> = pairs.iter().filter(|p| p.involves(address)).cloned().collect();
        if relevant.is_empty() {
            return None;
        }
        relevant.sort_by(|a, b| b.liquidity_usd.total_cmp(&a.liquidity_usd));

        let primary = &relevant[0];
        let identity = if primary.base_token.address == address {
            &primary.base_token
        } else {
            &primary.quote_token
        };

        Some(Self {
            address: address.to_string(),
            symbol: identity.symbol.clone(),
            name: identity.name.clone(),
            price_usd: primary.price_usd,
            liquidity_usd: relevant.iter().map(|p| p.liquidity_usd).sum(),
            volume_24h: relevant.iter().map(|p| p.volume_24h).sum(),
            price_change_24h: primary.price_change_24h,
            market_cap: primary.market_cap,
            buys_24h: relevant.iter().map(|p| p.buys_24h).sum(),
            sells_24h: relevant.iter().map(|p| p.sells_24h).sum(),
            fetched_at: Some(Utc::now()),
            pairs: relevant,
        })
    }
}

// =====================================================================================
// SCORING SHEET
// =====================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenScore {
    pub symbol: String,
    pub address: String,
    pub score: f64,
    pub category: String,
    pub notes: String,
    /// Columns without a dedicated field, keyed by normalised header.
    pub extra: BTreeMap<String, String>,
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

impl TokenScore {
    /// Maps a 2-D sheet (header row + data rows) to scores. Rows without a
    /// symbol or address are skipped; short rows default missing cells.
    pub fn from_sheet(values: &[Vec<String>]) -> Vec<Self> {
        let Some((header, rows)) = values.split_first() else {
            return Vec::new();
        };
        let columns: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();

        rows.iter()
            .filter_map(|row| {
                let mut score = TokenScore::default();
                for (idx, column) in columns.iter().enumerate() {
                    let cell = row.get(idx).map(|c| c.trim()).unwrap_or_default();
                    match column.as_str() {
                        "symbol" | "ticker" | "token" => score.symbol = cell.to_string(),
                        "address" | "token_address" | "contract" | "contract_address" | "mint" => {
                            score.address = cell.to_string()
                        }
                        "score" | "total_score" | "overall_score" => {
                            score.score = value_to_f64(&Value::String(cell.to_string())).unwrap_or(0.0)
                        }
                        "category" | "tier" | "rating" => score.category = cell.to_string(),
                        "notes" | "note" | "comment" | "comments" => score.notes = cell.to_string(),
                        "" => {}
                        other => {
                            if !cell.is_empty() {
                                score.extra.insert(other.to_string(), cell.to_string());
                            }
                        }
                    }
                }
                if score.symbol.is_empty() && score.address.is_empty() {
                    return None;
                }
                if score.category.is_empty() {
                    score.category = UNKNOWN.to_string();
                }
                Some(score)
            })
            .collect()
    }
}

// =====================================================================================
// FETCH OUTCOME
// =====================================================================================

/// Where a fetcher's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fresh cache hit; no upstream call was due.
    Cache,
    /// Fetched from upstream during this call.
    Upstream,
    /// Cached value served past its refresh interval (contention or failure).
    StaleCache,
    /// Nothing cached and upstream unavailable.
    Default,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Cache => write!(f, "cache"),
            DataSource::Upstream => write!(f, "upstream"),
            DataSource::StaleCache => write!(f, "stale-cache"),
            DataSource::Default => write!(f, "default"),
        }
    }
}

/// A fetcher result. Fetchers never fail; the fallback taken is recorded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fetched<T> {
    pub value: T,
    pub source: DataSource,
}

impl<T> Fetched<T> {
    pub fn new(value: T, source: DataSource) -> Self {
        Self { value, source }
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, DataSource::StaleCache | DataSource::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_token_row_defaults_missing_fields() {
        let row = json!({ "token_symbol": "ABC", "market_cap": "1,250.5", "holders": 12 });
        let token = TokenRecord::from_analytics_row(&row).unwrap();
        assert_eq!(token.symbol, "ABC");
        assert_eq!(token.name, "ABC");
        assert_eq!(token.address, "");
        assert_approx_eq!(token.market_cap, 1250.5);
        assert_eq!(token.holders, 12);
        assert_approx_eq!(token.volume_24h, 0.0);

        let bare = TokenRecord::from_analytics_row(&json!({})).unwrap();
        assert_eq!(bare.symbol, UNKNOWN);
        assert!(TokenRecord::from_analytics_row(&json!("row")).is_none());
    }

    #[test]
    fn test_sort_by_market_cap_descending() {
        let mut tokens: Vec<TokenRecord> = [("A", 10.0), ("B", 30.0), ("C", 20.0)]
            .iter()
            .map(|(s, mc)| TokenRecord::from_analytics_row(&json!({ "symbol": s, "market_cap": mc })).unwrap())
            .collect();
        sort_by_market_cap(&mut tokens);
        let order: Vec<&str> = tokens.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_market_stats_from_tokens() {
        let tokens: Vec<TokenRecord> = [(10.0, 1.0, 5), (20.0, 2.0, 7)]
            .iter()
            .map(|(mc, vol, h)| {
                TokenRecord::from_analytics_row(&json!({ "market_cap": mc, "volume_24h": vol, "holders": h }))
                    .unwrap()
            })
            .collect();
        let stats = MarketStats::from_tokens(&tokens);
        assert_approx_eq!(stats.total_market_cap, 30.0);
        assert_approx_eq!(stats.total_volume_24h, 3.0);
        assert_eq!(stats.total_holders, 12);
        assert_eq!(stats.token_count, 2);
    }

    #[test]
    fn test_pair_parsing_and_detail_summary() {
        let raw = json!([
            {
                "chainId": "solana", "dexId": "raydium", "pairAddress": "P1",
                "baseToken": { "address": "TOKEN", "name": "Token", "symbol": "TKN" },
                "quoteToken": { "address": "USDC", "symbol": "USDC" },
                "priceUsd": "1.25", "txns": { "h24": { "buys": 10, "sells": 4 } },
                "volume": { "h24": 1000.0 }, "liquidity": { "usd": 5000.0 }, "marketCap": 99.0
            },
            {
                "pairAddress": "P2",
                "baseToken": { "address": "TOKEN" },
                "priceUsd": 1.3, "volume": { "h24": "500" }, "liquidity": { "usd": 100.0 },
                "txns": { "h24": { "buys": 1 } }
            },
            { "pairAddress": "P3", "baseToken": { "address": "OTHER" } },
            // base58 addresses are case-sensitive: a different mint
            {
                "pairAddress": "P4",
                "baseToken": { "address": "token", "symbol": "FAKE" },
                "liquidity": { "usd": 1000000.0 }
            }
        ]);
        let pairs: Vec<PairData> = raw.as_array().unwrap().iter().map(PairData::from_value).collect();
        assert_eq!(pairs[1].quote_token.symbol, UNKNOWN);

        let detail = TokenDetail::from_pairs("TOKEN", &pairs).unwrap();
        assert_eq!(detail.symbol, "TKN");
        assert_eq!(detail.pairs.len(), 2);
        assert_approx_eq!(detail.price_usd, 1.25);
        assert_approx_eq!(detail.volume_24h, 1500.0);
        assert_eq!(detail.buys_24h, 11);
        assert_eq!(detail.sells_24h, 4);
        assert!(TokenDetail::from_pairs("NOPE", &pairs).is_none());
        assert_eq!(TokenDetail::from_pairs("token", &pairs).unwrap().symbol, "FAKE");
    }

    #[test]
    fn test_scores_from_sheet_maps_headers() {
        let sheet = vec![
            vec!["Symbol".to_string(), "Token Address".to_string(), "Score".to_string(), "Team".to_string()],
            vec!["ABC".to_string(), "addr1".to_string(), "8.5".to_string(), "doxxed".to_string()],
            vec!["".to_string(), "".to_string(), "3".to_string()],
            vec!["XYZ".to_string()],
        ];
        let scores = TokenScore::from_sheet(&sheet);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].address, "addr1");
        assert_approx_eq!(scores[0].score, 8.5);
        assert_eq!(scores[0].extra.get("team").map(String::as_str), Some("doxxed"));
        assert_eq!(scores[1].symbol, "XYZ");
        assert_eq!(scores[1].category, UNKNOWN);
        assert!(TokenScore::from_sheet(&[]).is_empty());
    }
}
