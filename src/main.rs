#![allow(dead_code)]

use arbitrex::config::Config;
use arbitrex::engine::Engine;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("================================================");
    info!("  arbitrex — 15-minute binary market arbitrage engine v0.1.0");
    info!("================================================");

    let config = Config::load_or_default();

    if let Err(e) = config.validate() {
        error!("config validation failed: {e}");
        warn!("continuing in dry-run mode");
    }

    if config.strategy.dry_run {
        warn!("DRY RUN MODE — no real orders will be submitted");
    }

    Engine::new(config).run().await
}
