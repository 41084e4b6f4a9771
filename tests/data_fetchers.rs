mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use token_dashboard::cache::{KeyValueStore, MemoryCache};
use token_dashboard::error::Result;
use token_dashboard::refresh::DataDomain;
use token_dashboard::testing::{MockReply, MockTransport};
use token_dashboard::types::{TokenDetail, TokenRecord};
use token_dashboard::{CacheClient, DashboardData, DataSource};

/// Backend whose reads see the state at call time but answer `read_delay`
/// later, like a distant redis.
struct SlowReadStore {
    inner: MemoryCache,
    read_delay: Duration,
}

#[async_trait]
impl KeyValueStore for SlowReadStore {
    fn name(&self) -> &str {
        "slow-read"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self.inner.get(key);
        tokio::time::sleep(self.read_delay).await;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.inner.remove(key))
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        Ok(self.inner.set_if_absent(key, value, ttl))
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool> {
        Ok(self.inner.delete_if_value(key, expected))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.inner.list_keys())
    }
}

#[tokio::test(start_paused = true)]
async fn cold_start_fetches_sorts_and_caches_tokens() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
        TOKENS_ROUTE,
        MockReply::Json(token_rows(&[("AAA", 10.0), ("BBB", 30.0), ("CCC", 20.0)])),
    );
    let (data, cache) = dashboard(transport.clone(), &test_config());

    let tokens = data.get_all_tokens().await;
    assert_eq!(tokens.source, DataSource::Upstream);
    let symbols: Vec<&str> = tokens.value.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BBB", "CCC", "AAA"]);

    let cached: Vec<TokenRecord> = cache.get("data:all_tokens").await.expect("tokens cached");
    assert_eq!(cached, tokens.value);
    assert!(data.coordinator().last_refresh_time(&DataDomain::AllTokens).await.is_some());

    // analytics key travels in the configured header
    let call = &transport.calls()[0];
    assert!(call.headers.iter().any(|(_, v)| v == "analytics-key"));

    // second read is served from cache
    let again = data.get_all_tokens().await;
    assert_eq!(again.source, DataSource::Cache);
    assert_eq!(again.value, tokens.value);
    assert_eq!(transport.calls_matching(TOKENS_ROUTE), 1);
}

#[tokio::test(start_paused = true)]
async fn cold_start_failure_returns_empty_list() {
    let transport = Arc::new(MockTransport::new());
    transport.on(TOKENS_ROUTE, MockReply::Status(500));
    let (data, cache) = dashboard(transport, &test_config());

    let tokens = data.get_all_tokens().await;
    assert_eq!(tokens.source, DataSource::Default);
    assert!(tokens.value.is_empty());
    assert!(cache.get_raw("data:all_tokens").await.is_none());
    assert!(data.coordinator().last_refresh_time(&DataDomain::AllTokens).await.is_none());
    // lock released for the next attempt
    assert!(cache.get_raw("refresh_lock:all_tokens").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn upstream_failure_serves_stale_value() {
    let transport = Arc::new(MockTransport::new());
    transport.on(TOKENS_ROUTE, MockReply::Json(token_rows(&[("AAA", 10.0), ("BBB", 5.0)])));
    let (data, _cache) = dashboard(transport.clone(), &test_config());
    let original = data.get_all_tokens().await.value;

    // two hours later the analytics API is down
    let last = Utc::now() - chrono::Duration::hours(2);
    data.coordinator().record_refresh_at(&DataDomain::AllTokens, last).await;
    transport.on(TOKENS_ROUTE, MockReply::Status(503));

    let tokens = data.get_all_tokens().await;
    assert_eq!(tokens.source, DataSource::StaleCache);
    assert_eq!(tokens.value, original);
    assert!(tokens.is_fallback());

    // 503 is retried up to the attempt ceiling; the timestamp is untouched
    assert_eq!(transport.calls_matching(TOKENS_ROUTE), 1 + 3);
    let recorded = data.coordinator().last_refresh_time(&DataDomain::AllTokens).await.unwrap();
    assert_eq!(recorded.timestamp_millis(), last.timestamp_millis());
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_trigger_one_upstream_fetch() {
    let transport = Arc::new(MockTransport::new().with_latency(Duration::from_secs(5)));
    transport.on(TOKENS_ROUTE, MockReply::Json(token_rows(&[("AAA", 1.0)])));
    let (data, _cache) = dashboard(transport.clone(), &test_config());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let data = data.clone();
            tokio::spawn(async move { data.get_all_tokens().await })
        })
        .collect();

    let mut sources = Vec::new();
    for handle in handles {
        sources.push(handle.await.unwrap().source);
    }

    assert_eq!(transport.calls_matching(TOKENS_ROUTE), 1);
    assert_eq!(sources.iter().filter(|s| **s == DataSource::Upstream).count(), 1);
    // losers did not wait for the winner: nothing was cached yet
    assert_eq!(sources.iter().filter(|s| **s == DataSource::Default).count(), 9);
}

#[tokio::test(start_paused = true)]
async fn caller_that_wins_lock_after_another_refresh_does_not_refetch() {
    let transport = Arc::new(MockTransport::new().with_latency(Duration::from_secs(5)));
    transport.on(TOKENS_ROUTE, MockReply::Json(token_rows(&[("AAA", 1.0)])));
    let store = SlowReadStore {
        inner: MemoryCache::new(),
        read_delay: Duration::from_secs(2),
    };
    let cache = Arc::new(CacheClient::with_backend(Arc::new(store)));
    let data = Arc::new(DashboardData::new(cache, transport.clone(), &test_config()).unwrap());

    // first caller holds the lock from t=2s and records its refresh at t=9s
    let first = {
        let data = data.clone();
        tokio::spawn(async move { data.get_all_tokens().await })
    };
    // second caller reads the timestamp at t=8s (still unset), so it sees the
    // domain as due, then takes the lock at t=10s after the first released it
    let second = {
        let data = data.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(8)).await;
            data.get_all_tokens().await
        })
    };

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_eq!(first.source, DataSource::Upstream);
    assert_eq!(second.source, DataSource::Cache);
    assert_eq!(second.value, first.value);
    assert_eq!(transport.calls_matching(TOKENS_ROUTE), 1);
}

#[tokio::test(start_paused = true)]
async fn batch_details_isolate_failed_batch() {
    let addresses: Vec<String> = (1..=12).map(|i| format!("addr{:02}", i)).collect();
    let transport = Arc::new(MockTransport::new());
    // second batch of five is addr06..addr10
    transport.on("addr06", MockReply::Status(500));
    transport.on(DEX_TOKENS_ROUTE, MockReply::Json(dex_pairs(&addresses)));
    let (data, cache) = dashboard(transport.clone(), &test_config());

    let details = data.get_token_details(&addresses).await;
    assert_eq!(details.len(), 12);
    for (i, address) in addresses.iter().enumerate() {
        let entry = &details[address];
        if (5..10).contains(&i) {
            assert!(entry.is_none(), "{} should be unavailable", address);
            assert!(cache.get_raw(&format!("data:token_detail:{}", address)).await.is_none());
        } else {
            let fetched = entry.as_ref().expect("populated detail");
            assert_eq!(fetched.source, DataSource::Upstream);
            assert_eq!(fetched.value.symbol, address.to_uppercase());
            let cached: TokenDetail = cache
                .get(&format!("data:token_detail:{}", address))
                .await
                .expect("detail cached");
            assert_eq!(cached.address, *address);
        }
        assert!(cache
            .get_raw(&format!("refresh_lock:token_detail:{}", address))
            .await
            .is_none());
    }
    assert_eq!(transport.calls_matching(DEX_TOKENS_ROUTE), 3);

    // fresh entries come from cache; only the failed batch is retried
    let again = data.get_token_details(&addresses).await;
    assert_eq!(again["addr01"].as_ref().unwrap().source, DataSource::Cache);
    assert!(again["addr07"].is_none());
    assert_eq!(transport.calls_matching(DEX_TOKENS_ROUTE), 4);
}

#[tokio::test(start_paused = true)]
async fn token_detail_contended_lock_serves_default_without_fetching() {
    let transport = Arc::new(MockTransport::new());
    transport.on(DEX_TOKENS_ROUTE, MockReply::Json(dex_pairs(&["tok".to_string()])));
    let (data, _cache) = dashboard(transport.clone(), &test_config());
    let domain = DataDomain::TokenDetail("tok".to_string());

    let lock = data.coordinator().acquire_refresh_lock(&domain).await.unwrap();
    let detail = data.get_token_detail("tok").await;
    assert_eq!(detail.source, DataSource::Default);
    assert_eq!(detail.value, TokenDetail::empty("tok"));
    assert_eq!(transport.call_count(), 0);

    assert!(data.coordinator().release_refresh_lock(lock).await);
    let detail = data.get_token_detail("tok").await;
    assert_eq!(detail.source, DataSource::Upstream);
    assert_eq!(detail.value.symbol, "TOK");
    assert_eq!(detail.value.buys_24h, 3);
}

#[tokio::test(start_paused = true)]
async fn unknown_pair_is_none_and_known_pair_is_cached() {
    let transport = Arc::new(MockTransport::new());
    transport.on("/pairs/solana/missing", MockReply::Json(serde_json::json!({ "pairs": null })));
    transport.on(
        "/pairs/solana/pair-tok",
        MockReply::Json(dex_pairs(&["tok".to_string()])),
    );
    let (data, _cache) = dashboard(transport, &test_config());

    let missing = data.get_pair("missing").await;
    assert_eq!(missing.source, DataSource::Upstream);
    assert!(missing.value.is_none());

    let pair = data.get_pair("pair-tok").await;
    assert_eq!(pair.value.unwrap().base_token.symbol, "TOK");
    assert_eq!(data.get_pair("pair-tok").await.source, DataSource::Cache);
}

#[tokio::test(start_paused = true)]
async fn market_stats_derived_from_token_list() {
    let transport = Arc::new(MockTransport::new());
    transport.on(TOKENS_ROUTE, MockReply::Json(token_rows(&[("AAA", 100.0), ("BBB", 50.0)])));
    let (data, _cache) = dashboard(transport.clone(), &test_config());

    let stats = data.get_market_stats().await;
    assert_eq!(stats.source, DataSource::Upstream);
    assert_eq!(stats.value.token_count, 2);
    assert_eq!(stats.value.total_holders, 200);
    assert!((stats.value.total_market_cap - 150.0).abs() < f64::EPSILON);

    // the token list fetched on the way is reused
    assert_eq!(data.get_all_tokens().await.source, DataSource::Cache);
    assert_eq!(transport.calls_matching(TOKENS_ROUTE), 1);
}

#[tokio::test(start_paused = true)]
async fn market_stats_without_any_tokens_fall_back_to_default() {
    let transport = Arc::new(MockTransport::new());
    transport.on(TOKENS_ROUTE, MockReply::NetworkError);
    let (data, cache) = dashboard(transport, &test_config());

    let stats = data.get_market_stats().await;
    assert_eq!(stats.source, DataSource::Default);
    assert_eq!(stats.value.token_count, 0);
    assert!(cache.get_raw("data:market_stats").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn market_stats_are_not_derived_from_stale_token_list() {
    let transport = Arc::new(MockTransport::new());
    transport.on(TOKENS_ROUTE, MockReply::Json(token_rows(&[("AAA", 100.0)])));
    let (data, cache) = dashboard(transport.clone(), &test_config());
    assert_eq!(data.get_all_tokens().await.source, DataSource::Upstream);

    let last = Utc::now() - chrono::Duration::hours(2);
    data.coordinator().record_refresh_at(&DataDomain::AllTokens, last).await;
    transport.on(TOKENS_ROUTE, MockReply::Status(503));

    let stats = data.get_market_stats().await;
    assert_eq!(stats.source, DataSource::Default);
    assert!(cache.get_raw("data:market_stats").await.is_none());
    assert!(data
        .coordinator()
        .last_refresh_time(&DataDomain::MarketStats)
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn token_scores_map_sheet_columns() {
    let transport = Arc::new(MockTransport::new());
    transport.on(SHEET_ROUTE, MockReply::Json(score_sheet()));
    let (data, _cache) = dashboard(transport.clone(), &test_config());

    let scores = data.get_token_scores().await;
    assert_eq!(scores.source, DataSource::Upstream);
    assert_eq!(scores.value.len(), 2);
    assert_eq!(scores.value[0].category, "Blue chip");
    assert_eq!(scores.value[1].category, "Unknown");
    assert!(transport.calls()[0].url.ends_with("?key=sheet-key"));
}
