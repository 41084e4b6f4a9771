use crate::utils::redact_credentials;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: Option<String>,
    pub cache_value_ttl_secs: u64,
    pub refresh_lock_ttl_secs: u64,
    pub refresh_guard_secs: u64,
    pub aggregate_refresh_interval_secs: u64,
    pub dex_refresh_interval_secs: u64,
    pub rate_limit_per_minute: u32,
    pub rate_limit_buffer_ms: u64,
    pub api_max_retries: u32,
    pub api_initial_backoff_ms: u64,
    pub api_max_backoff_ms: u64,
    pub http_timeout_secs: u64,
    pub dex_batch_size: usize,
    pub batch_pause_ms: u64,
    pub analytics_api_url: String,
    pub analytics_api_key: Option<String>,
    pub analytics_api_key_header: String,
    pub tokens_query_id: Option<String>,
    pub market_stats_query_id: Option<String>,
    pub analytics_row_limit: u32,
    pub dex_api_url: String,
    pub dex_chain_id: String,
    pub sheets_api_url: String,
    pub sheets_spreadsheet_id: Option<String>,
    pub sheets_range: String,
    pub sheets_api_key: Option<String>,
    pub admin_token: Option<String>,
    pub admin_bind_addr: String,
    pub scheduler_interval_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            redis_url: None,
            cache_value_ttl_secs: 86_400,
            refresh_lock_ttl_secs: 300,
            refresh_guard_secs: 60,
            aggregate_refresh_interval_secs: 3_600,
            dex_refresh_interval_secs: 300,
            rate_limit_per_minute: 30,
            rate_limit_buffer_ms: 1_000,
            api_max_retries: 3,
            api_initial_backoff_ms: 1_000,
            api_max_backoff_ms: 30_000,
            http_timeout_secs: 30,
            dex_batch_size: 5,
            batch_pause_ms: 1_000,
            analytics_api_url: "https://api.dune.com/api/v1".to_string(),
            analytics_api_key: None,
            analytics_api_key_header: "X-Dune-API-Key".to_string(),
            tokens_query_id: None,
            market_stats_query_id: None,
            analytics_row_limit: 1_000,
            dex_api_url: "https://api.dexscreener.com".to_string(),
            dex_chain_id: "solana".to_string(),
            sheets_api_url: "https://sheets.googleapis.com/v4".to_string(),
            sheets_spreadsheet_id: None,
            sheets_range: "Sheet1!A1:Z1000".to_string(),
            sheets_api_key: None,
            admin_token: None,
            admin_bind_addr: "0.0.0.0:8080".to_string(),
            scheduler_interval_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

/// Reads an optional, non-empty string variable.
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            redis_url: env_opt("REDIS_URL"),
            cache_value_ttl_secs: env_or("CACHE_VALUE_TTL_SECS", defaults.cache_value_ttl_secs),
            refresh_lock_ttl_secs: env_or("REFRESH_LOCK_TTL_SECS", defaults.refresh_lock_ttl_secs),
            refresh_guard_secs: env_or("REFRESH_GUARD_SECS", defaults.refresh_guard_secs),
            aggregate_refresh_interval_secs: env_or(
                "AGGREGATE_REFRESH_INTERVAL_SECS",
                defaults.aggregate_refresh_interval_secs,
            ),
            dex_refresh_interval_secs: env_or(
                "DEX_REFRESH_INTERVAL_SECS",
                defaults.dex_refresh_interval_secs,
            ),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            rate_limit_buffer_ms: env_or("RATE_LIMIT_BUFFER_MS", defaults.rate_limit_buffer_ms),
            api_max_retries: env_or("API_MAX_RETRIES", defaults.api_max_retries),
            api_initial_backoff_ms: env_or("API_INITIAL_BACKOFF_MS", defaults.api_initial_backoff_ms),
            api_max_backoff_ms: env_or("API_MAX_BACKOFF_MS", defaults.api_max_backoff_ms),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            dex_batch_size: env_or("DEX_BATCH_SIZE", defaults.dex_batch_size),
            batch_pause_ms: env_or("BATCH_PAUSE_MS", defaults.batch_pause_ms),
            analytics_api_url: env_opt("ANALYTICS_API_URL").unwrap_or(defaults.analytics_api_url),
            analytics_api_key: env_opt("ANALYTICS_API_KEY"),
            analytics_api_key_header: env_opt("ANALYTICS_API_KEY_HEADER")
                .unwrap_or(defaults.analytics_api_key_header),
            tokens_query_id: env_opt("TOKENS_QUERY_ID"),
            market_stats_query_id: env_opt("MARKET_STATS_QUERY_ID"),
            analytics_row_limit: env_or("ANALYTICS_ROW_LIMIT", defaults.analytics_row_limit),
            dex_api_url: env_opt("DEX_API_URL").unwrap_or(defaults.dex_api_url),
            dex_chain_id: env_opt("DEX_CHAIN_ID").unwrap_or(defaults.dex_chain_id),
            sheets_api_url: env_opt("SHEETS_API_URL").unwrap_or(defaults.sheets_api_url),
            sheets_spreadsheet_id: env_opt("SHEETS_SPREADSHEET_ID"),
            sheets_range: env_opt("SHEETS_RANGE").unwrap_or(defaults.sheets_range),
            sheets_api_key: env_opt("SHEETS_API_KEY"),
            admin_token: env_opt("ADMIN_TOKEN"),
            admin_bind_addr: env_opt("ADMIN_BIND_ADDR").unwrap_or(defaults.admin_bind_addr),
            scheduler_interval_secs: env_or(
                "SCHEDULER_INTERVAL_SECS",
                defaults.scheduler_interval_secs,
            ),
            log_level: env_opt("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn aggregate_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.aggregate_refresh_interval_secs)
    }

    pub fn dex_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.dex_refresh_interval_secs)
    }

    pub fn refresh_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_lock_ttl_secs)
    }

    pub fn refresh_guard(&self) -> Duration {
        Duration::from_secs(self.refresh_guard_secs)
    }

    pub fn cache_value_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_value_ttl_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn validate_and_log(&self) {
        // Keys and tokens stay out of the log line
        log::info!(
            "Configuration loaded: redis={} rate_limit={}/min retries={} backoff={}ms batch={} \
             aggregate_interval={}s dex_interval={}s lock_ttl={}s admin={}",
            self.redis_url
                .as_deref()
                .map(redact_credentials)
                .unwrap_or_else(|| "<memory only>".to_string()),
            self.rate_limit_per_minute,
            self.api_max_retries,
            self.api_initial_backoff_ms,
            self.dex_batch_size,
            self.aggregate_refresh_interval_secs,
            self.dex_refresh_interval_secs,
            self.refresh_lock_ttl_secs,
            self.admin_bind_addr,
        );
        if self.tokens_query_id.is_none() {
            log::warn!("TOKENS_QUERY_ID is not set; the token list will only ever serve cached data");
        }
        if self.sheets_spreadsheet_id.is_none() {
            log::warn!("SHEETS_SPREADSHEET_ID is not set; token scores are disabled");
        }
        if self.admin_token.is_none() {
            log::warn!("ADMIN_TOKEN is not set; admin endpoints will reject every request");
        }
    }
}
