pub mod settings;

pub use settings::Config;

use crate::error::DashboardError;
use std::sync::Arc;
use url::Url;

/// Loads and returns the application configuration as an `Arc<Config>`.
/// Reads a `.env` file first if one is present, then validates the values
/// the cache and fetch layers cannot run without. Call
/// `Config::validate_and_log` once logging is up.
pub fn load_config() -> Result<Arc<Config>, DashboardError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = Config::from_env();
    validate(&config)?;

    Ok(Arc::new(config))
}

pub fn validate(config: &Config) -> Result<(), DashboardError> {
    if config.rate_limit_per_minute == 0 {
        return Err(DashboardError::ConfigError(
            "RATE_LIMIT_PER_MINUTE must be greater than zero".to_string(),
        ));
    }
    if config.dex_batch_size == 0 {
        return Err(DashboardError::ConfigError(
            "DEX_BATCH_SIZE must be greater than zero".to_string(),
        ));
    }
    if config.api_max_retries == 0 {
        return Err(DashboardError::ConfigError(
            "API_MAX_RETRIES must be greater than zero".to_string(),
        ));
    }
    for (name, value) in [
        ("ANALYTICS_API_URL", &config.analytics_api_url),
        ("DEX_API_URL", &config.dex_api_url),
        ("SHEETS_API_URL", &config.sheets_api_url),
    ] {
        Url::parse(value)
            .map_err(|e| DashboardError::ConfigError(format!("{} is not a valid URL: {}", name, e)))?;
    }
    Ok(())
}
