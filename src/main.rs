// src/main.rs
use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use token_dashboard::{
    admin::AdminServer,
    config::load_config,
    fetchers::DashboardData,
    refresh::{scheduler::spawn_refresh_scheduler, DataDomain},
    utils::{format_duration, setup_logging},
};

#[derive(Debug, Parser)]
#[command(name = "token-dashboard", version, about = "Token analytics data refresh and cache service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the refresh scheduler and the admin HTTP server
    Serve,
    /// Refresh every aggregate domain once
    Refresh {
        /// Clear the whole cache before refreshing
        #[arg(long)]
        clear_cache: bool,
    },
    /// Print cache and refresh status as JSON
    Status,
    /// List cache keys
    Keys,
    /// Clear the given cache keys, or everything when none are given
    ClearCache { keys: Vec<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config().context("loading configuration")?;
    setup_logging(&config.log_level).context("initializing logging")?;
    config.validate_and_log();
    info!("🚀 token-dashboard {} starting", env!("CARGO_PKG_VERSION"));

    let data = Arc::new(
        DashboardData::from_config(&config)
            .await
            .context("building data service")?,
    );

    match cli.command {
        Command::Serve => {
            let scheduler = spawn_refresh_scheduler(
                data.clone(),
                Duration::from_secs(config.scheduler_interval_secs),
            );
            let server = AdminServer::new(config.admin_bind_addr.clone(), data, config.admin_token.clone());

            tokio::select! {
                result = server.start() => result.context("admin server stopped")?,
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            }
            scheduler.abort();
        }
        Command::Refresh { clear_cache } => {
            let result = data.refresh_all(clear_cache).await;
            if result.success {
                info!("✅ {}", result.message);
            } else {
                warn!("⚠️ {}", result.message);
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Status => {
            let status = data.get_cache_status().await;
            let timing = data
                .coordinator()
                .time_until_next_refresh(&DataDomain::AllTokens)
                .await;
            info!(
                "Token list: {:?}, next refresh in {}",
                status.cache_health,
                format_duration(timing.time_remaining)
            );
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Keys => {
            for key in data.list_cache_keys().await {
                println!("{}", key);
            }
        }
        Command::ClearCache { keys } => {
            let keys = (!keys.is_empty()).then_some(keys);
            let result = data.clear_cache(keys.as_deref()).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
