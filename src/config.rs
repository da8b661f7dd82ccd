use crate::models::market::Asset;
use crate::venue::VenueConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub venue: VenueConfig,
    pub strategy: StrategyConfig,
    pub blackout: BlackoutConfig,
    pub telemetry: TelemetryConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub enabled: bool,
    pub markets: Vec<Asset>,
    pub min_spread_threshold: f64,
    pub min_trade_size_usd: f64,
    pub max_trade_size_usd: f64,
    pub max_per_window_usd: f64,
    pub max_daily_exposure_usd: f64,
    pub max_daily_loss_usd: f64,
    pub max_unhedged_exposure_usd: f64,
    pub max_slippage_cents: f64,
    pub order_timeout_seconds: u64,
    pub parallel_fill_timeout_seconds: u64,
    pub max_liquidity_consumption_pct: f64,
    pub price_buffer_cents: f64,
    pub min_hedge_ratio: f64,
    pub critical_hedge_ratio: f64,
    pub max_position_imbalance_shares: f64,
    pub partial_fill_exit_enabled: bool,
    pub partial_fill_max_slippage_cents: f64,
    pub gradual_entry_enabled: bool,
    pub gradual_entry_tranches: u32,
    pub gradual_entry_delay_seconds: u64,
    pub gradual_entry_min_spread_cents: f64,
    pub balance_sizing_enabled: bool,
    pub balance_sizing_pct: f64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackoutConfig {
    pub blackout_enabled: bool,
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_trade: bool,
    pub alert_on_error: bool,
    pub alert_on_circuit_breaker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
}

impl StrategyConfig {
    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_seconds)
    }

    pub fn parallel_fill_timeout(&self) -> Duration {
        Duration::from_secs(self.parallel_fill_timeout_seconds)
    }

    pub fn price_buffer(&self) -> rust_decimal::Decimal {
        rust_decimal::Decimal::try_from(self.price_buffer_cents / 100.0).unwrap_or_default()
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            markets: vec![Asset::BTC, Asset::ETH],
            min_spread_threshold: 0.02,
            min_trade_size_usd: 5.0,
            max_trade_size_usd: 50.0,
            max_per_window_usd: 50.0,
            max_daily_exposure_usd: 500.0,
            max_daily_loss_usd: 50.0,
            max_unhedged_exposure_usd: 25.0,
            max_slippage_cents: 1.0,
            order_timeout_seconds: 5,
            parallel_fill_timeout_seconds: 5,
            max_liquidity_consumption_pct: 0.5,
            price_buffer_cents: 1.0,
            min_hedge_ratio: 0.8,
            critical_hedge_ratio: 0.5,
            max_position_imbalance_shares: 50.0,
            partial_fill_exit_enabled: true,
            partial_fill_max_slippage_cents: 2.0,
            gradual_entry_enabled: false,
            gradual_entry_tranches: 1,
            gradual_entry_delay_seconds: 2,
            gradual_entry_min_spread_cents: 4.0,
            balance_sizing_enabled: false,
            balance_sizing_pct: 0.10,
            dry_run: false,
        }
    }
}

impl Default for BlackoutConfig {
    fn default() -> Self {
        Self {
            blackout_enabled: false,
            start_hour: 5,
            start_minute: 0,
            end_hour: 5,
            end_minute: 30,
            timezone: "America/New_York".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venue: VenueConfig {
                clob_host: "https://clob.polymarket.com".into(),
                ws_host: "wss://ws-subscriptions-clob.polymarket.com/ws/market".into(),
                gamma_api_host: "https://gamma-api.polymarket.com".into(),
                chain_id: 137,
                private_key: String::new(),
                funder_address: None,
                signature_type: 0,
                collateral_token: "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174".into(),
                conditional_tokens_address: "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045".into(),
                rpc_url: "https://polygon-rpc.com".into(),
            },
            strategy: StrategyConfig::default(),
            blackout: BlackoutConfig::default(),
            telemetry: TelemetryConfig {
                log_level: "info".into(),
                telegram_bot_token: None,
                telegram_chat_id: None,
                discord_webhook_url: None,
                alert_on_trade: true,
                alert_on_error: true,
                alert_on_circuit_breaker: true,
            },
            store: StoreConfig {
                database_url: "sqlite://arbitrex.db".into(),
            },
        }
    }
}

impl Config {
    /// Loads configuration from environment variables (`.env` in
    /// development), layered over defaults.
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();
        let mut config = Self::default();

        if let Ok(key) = std::env::var("VENUE_PRIVATE_KEY") {
            if !key.is_empty() {
                config.venue.private_key = key;
            }
        }
        if let Ok(addr) = std::env::var("VENUE_FUNDER_ADDRESS") {
            if !addr.is_empty() {
                config.venue.funder_address = Some(addr);
            }
        }
        if let Ok(sig) = std::env::var("VENUE_SIGNATURE_TYPE") {
            config.venue.signature_type = sig.parse().unwrap_or(0);
        }
        if let Ok(url) = std::env::var("VENUE_RPC_URL") {
            if !url.is_empty() {
                config.venue.rpc_url = url;
            }
        }

        if let Ok(v) = std::env::var("DRY_RUN") {
            config.strategy.dry_run = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("MIN_SPREAD_THRESHOLD") {
            if let Ok(parsed) = v.parse() {
                config.strategy.min_spread_threshold = parsed;
            }
        }
        if let Ok(v) = std::env::var("MAX_TRADE_SIZE_USD") {
            if let Ok(parsed) = v.parse() {
                config.strategy.max_trade_size_usd = parsed;
            }
        }
        if let Ok(v) = std::env::var("MAX_DAILY_LOSS_USD") {
            if let Ok(parsed) = v.parse() {
                config.strategy.max_daily_loss_usd = parsed;
            }
        }

        if let Ok(v) = std::env::var("BLACKOUT_ENABLED") {
            config.blackout.blackout_enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            if !v.is_empty() {
                config.store.database_url = v;
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }

        if config.venue.private_key.is_empty() && !config.strategy.dry_run {
            tracing::warn!("no VENUE_PRIVATE_KEY set, forcing dry-run mode");
            config.strategy.dry_run = true;
        }

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.strategy.dry_run {
            anyhow::ensure!(!self.venue.private_key.is_empty(), "VENUE_PRIVATE_KEY must be set unless dry_run");
        }
        anyhow::ensure!(
            self.strategy.min_trade_size_usd > 0.0 && self.strategy.min_trade_size_usd <= self.strategy.max_trade_size_usd,
            "min_trade_size_usd must be positive and <= max_trade_size_usd"
        );
        anyhow::ensure!(self.strategy.min_spread_threshold > 0.0, "min_spread_threshold must be positive");
        anyhow::ensure!(
            self.blackout.start_hour < 24 && self.blackout.end_hour < 24,
            "blackout hours must be in 0..24"
        );
        anyhow::ensure!(
            self.blackout.start_minute < 60 && self.blackout.end_minute < 60,
            "blackout minutes must be in 0..60"
        );
        anyhow::ensure!(
            self.strategy.min_hedge_ratio > 0.0 && self.strategy.min_hedge_ratio <= 1.0,
            "min_hedge_ratio must be in (0, 1]"
        );
        anyhow::ensure!(
            self.strategy.critical_hedge_ratio > 0.0 && self.strategy.critical_hedge_ratio <= self.strategy.min_hedge_ratio,
            "critical_hedge_ratio must be positive and <= min_hedge_ratio"
        );
        Ok(())
    }
}
