#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use token_dashboard::testing::MockTransport;
use token_dashboard::{CacheClient, Config, DashboardData};

pub const TOKENS_ROUTE: &str = "/query/tokens-q/results";
pub const SHEET_ROUTE: &str = "/spreadsheets/sheet-1/values/";
pub const DEX_TOKENS_ROUTE: &str = "/tokens/solana/";

pub fn test_config() -> Config {
    Config {
        analytics_api_url: "https://analytics.test/api/v1".to_string(),
        analytics_api_key: Some("analytics-key".to_string()),
        tokens_query_id: Some("tokens-q".to_string()),
        market_stats_query_id: None,
        dex_api_url: "https://dex.test".to_string(),
        sheets_api_url: "https://sheets.test/v4".to_string(),
        sheets_spreadsheet_id: Some("sheet-1".to_string()),
        sheets_api_key: Some("sheet-key".to_string()),
        api_initial_backoff_ms: 100,
        ..Config::default()
    }
}

pub fn dashboard(transport: Arc<MockTransport>, config: &Config) -> (Arc<DashboardData>, Arc<CacheClient>) {
    let cache = Arc::new(CacheClient::memory_only());
    let data = DashboardData::new(cache.clone(), transport, config).expect("valid test config");
    (Arc::new(data), cache)
}

/// Analytics payload with one row per `(symbol, market_cap)`.
pub fn token_rows(rows: &[(&str, f64)]) -> Value {
    let rows: Vec<Value> = rows
        .iter()
        .map(|(symbol, market_cap)| {
            json!({
                "symbol": symbol,
                "name": format!("{} Token", symbol),
                "address": format!("{}-addr", symbol.to_lowercase()),
                "market_cap": market_cap,
                "volume_24h": market_cap / 10.0,
                "holders": 100
            })
        })
        .collect();
    json!({ "result": { "rows": rows } })
}

pub fn score_sheet() -> Value {
    json!({
        "values": [
            ["Symbol", "Address", "Score", "Category"],
            ["AAA", "aaa-addr", "9", "Blue chip"],
            ["BBB", "bbb-addr", "4.5"]
        ]
    })
}

/// DEX payload listing one pair for each address.
pub fn dex_pairs(addresses: &[String]) -> Value {
    let pairs: Vec<Value> = addresses
        .iter()
        .map(|address| {
            json!({
                "chainId": "solana",
                "dexId": "raydium",
                "pairAddress": format!("pair-{}", address),
                "baseToken": { "address": address, "name": address, "symbol": address.to_uppercase() },
                "quoteToken": { "address": "usdc", "name": "USD Coin", "symbol": "USDC" },
                "priceUsd": "1.5",
                "volume": { "h24": 1000.0 },
                "liquidity": { "usd": 5000.0 },
                "txns": { "h24": { "buys": 3, "sells": 2 } }
            })
        })
        .collect();
    json!({ "pairs": pairs })
}
