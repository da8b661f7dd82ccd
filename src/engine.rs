//! Engine (spec.md §4.11 C12): owns configuration, builds every component,
//! and runs them concurrently until a shutdown signal arrives.

use crate::book_tracker::BookTracker;
use crate::config::Config;
use crate::discovery::MarketDiscovery;
use crate::executor::{DualLegTunables, Executor};
use crate::models::blackout::BlackoutState;
use crate::models::daily::DailyCounters;
use crate::opportunity_queue;
use crate::position_manager::{PositionManager, PositionManagerObserver};
use crate::risk_gate::RiskGateConfig;
use crate::sizer::SizerConfig;
use crate::store::{SqliteStore, Store};
use crate::telemetry::{AlertManager, EventBus, LatencyTracker, PnlTracker};
use crate::venue::settlement::SettlementClient;
use crate::venue::{PolymarketClient, VenueAdapter};
use crate::settlement_worker::SettlementWorker;
use chrono::Timelike;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

const MAINTENANCE_TICK: std::time::Duration = std::time::Duration::from_millis(50);
const MARKET_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
const BALANCE_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
const BLACKOUT_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const TELEMETRY_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub struct Engine {
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.config;

        let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&config.store.database_url).await?);
        let venue: Arc<dyn VenueAdapter> = Arc::new(PolymarketClient::new(config.venue.clone()));

        let (opp_tx, opp_rx) = opportunity_queue::channel();
        let mut book_tracker = BookTracker::new(
            config.venue.ws_host.clone(),
            (Decimal::try_from(config.strategy.min_spread_threshold).unwrap_or_default() * Decimal::from(100)).round().to_string().parse().unwrap_or(2),
            opp_tx,
        );

        let positions = Arc::new(PositionManager::new());
        book_tracker.set_observer(Box::new(PositionManagerObserver::new(positions.clone())));
        let book_tracker = Arc::new(book_tracker);
        let events = EventBus::new();
        let latency = Arc::new(LatencyTracker::new(1000));
        let alerts = Arc::new(AlertManager::new(config.telemetry.clone()));

        let breaker_initial = store.get_circuit_breaker_state().await.unwrap_or_default();
        let circuit_breaker = Arc::new(RwLock::new(breaker_initial));
        let daily = Arc::new(RwLock::new(DailyCounters::new_for_today()));
        let blackout = Arc::new(RwLock::new(BlackoutState::default()));

        let discovery = Arc::new(MarketDiscovery::new(
            reqwest::Client::new(),
            config.venue.gamma_api_host.clone(),
            config.strategy.markets.clone(),
            store.clone(),
        ));

        let signer = if config.venue.private_key.is_empty() {
            None
        } else {
            alloy_signer_local::PrivateKeySigner::from_str(config.venue.private_key.trim_start_matches("0x")).ok()
        };
        let settlement_worker = signer.map(|wallet| {
            SettlementClient::new(
                &config.venue.rpc_url,
                wallet,
                &config.venue.conditional_tokens_address,
                &config.venue.collateral_token,
                config.venue.chain_id,
            )
        });

        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let risk_config = RiskGateConfig {
            min_spread_threshold: Decimal::try_from(config.strategy.min_spread_threshold).unwrap_or_default(),
            max_daily_exposure: Decimal::try_from(config.strategy.max_daily_exposure_usd).unwrap_or_default(),
            max_daily_loss: Decimal::try_from(config.strategy.max_daily_loss_usd).unwrap_or_default(),
            min_trade_size_usd: Decimal::try_from(config.strategy.min_trade_size_usd).unwrap_or_default(),
        };
        let sizer_config = SizerConfig {
            max_trade_size_usd: Decimal::try_from(config.strategy.max_trade_size_usd).unwrap_or_default(),
            min_trade_size_usd: Decimal::try_from(config.strategy.min_trade_size_usd).unwrap_or_default(),
            max_liquidity_consumption_pct: Decimal::try_from(config.strategy.max_liquidity_consumption_pct).unwrap_or_default(),
            gradual_entry_tranches: if config.strategy.gradual_entry_enabled { config.strategy.gradual_entry_tranches } else { 1 },
            tranche_delay: std::time::Duration::from_secs(config.strategy.gradual_entry_delay_seconds),
        };
        let dual_leg = DualLegTunables {
            buffer: config.strategy.price_buffer(),
            max_consumption_fraction: Decimal::try_from(config.strategy.max_liquidity_consumption_pct).unwrap_or_default(),
            min_hedge_ratio: Decimal::try_from(config.strategy.min_hedge_ratio).unwrap_or_default(),
            critical_hedge_ratio: Decimal::try_from(config.strategy.critical_hedge_ratio).unwrap_or_default(),
            t_submit_secs: config.strategy.order_timeout_seconds,
            t_live_secs: config.strategy.parallel_fill_timeout_seconds,
            slippage: Decimal::try_from(config.strategy.max_slippage_cents / 100.0).unwrap_or_default(),
        };

        let executor = Arc::new(Executor::new(
            book_tracker.clone(),
            venue.clone(),
            store.clone(),
            positions.clone(),
            events.clone(),
            latency.clone(),
            circuit_breaker.clone(),
            daily.clone(),
            config.strategy.dry_run,
            risk_config,
            sizer_config,
            dual_leg,
        ));

        // --- WS subscriber task (C4) ---
        {
            let tracker = book_tracker.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                tracker.run(shutdown_rx).await;
            });
        }

        // --- Opportunity Queue consumer (C8 driver) ---
        {
            let executor = executor.clone();
            let blackout = blackout.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                executor
                    .run(opp_rx, shutdown_rx, move || {
                        blackout.try_read().map(|b| b.in_blackout).unwrap_or(false)
                    })
                    .await;
            });
        }

        // --- Settlement Worker (C11): stale-order cancellation + redemption ---
        if let Some(Ok(settlement_client)) = settlement_worker {
            let settlement_client = Arc::new(settlement_client);
            let worker = SettlementWorker::new(
                store.clone(),
                venue.clone(),
                settlement_client,
                Decimal::try_from(config.strategy.max_daily_loss_usd).unwrap_or_default(),
            );
            let tracker = book_tracker.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                worker
                    .run(shutdown_rx, move || tracker.tracked_token_ids().into_iter().collect::<HashSet<_>>())
                    .await;
            });
        } else if !config.strategy.dry_run {
            warn!("no usable on-chain signer; settlement worker will not run");
        }

        // --- Maintenance loop: daily reset, market refresh, balance refresh ---
        {
            let daily = daily.clone();
            let discovery = discovery.clone();
            let tracker = book_tracker.clone();
            let venue = venue.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(MAINTENANCE_TICK);
                let mut last_market_refresh = tokio::time::Instant::now();
                let mut last_balance_refresh = tokio::time::Instant::now();
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("maintenance loop shutting down");
                            return;
                        }
                        _ = tick.tick() => {
                            if daily.write().await.roll_if_stale() {
                                info!("daily counters rolled over");
                            }
                            if last_market_refresh.elapsed() >= MARKET_REFRESH_INTERVAL {
                                last_market_refresh = tokio::time::Instant::now();
                                for market in discovery.find_active_markets().await {
                                    tracker.register_market(market);
                                }
                            }
                            if last_balance_refresh.elapsed() >= BALANCE_REFRESH_INTERVAL {
                                last_balance_refresh = tokio::time::Instant::now();
                                if let Err(e) = venue.get_balance().await {
                                    warn!("balance refresh failed: {e}");
                                }
                            }
                        }
                    }
                }
            });
        }

        // --- Blackout checker (once per minute) ---
        {
            let blackout = blackout.clone();
            let events = events.clone();
            let cfg = config.blackout.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let tz: chrono_tz::Tz = cfg.timezone.parse().unwrap_or(chrono_tz::UTC);
                let mut tick = tokio::time::interval(BLACKOUT_CHECK_INTERVAL);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => return,
                        _ = tick.tick() => {
                            let now_local = chrono::Utc::now().with_timezone(&tz);
                            let minutes = now_local.hour() * 60 + now_local.minute();
                            let mut guard = blackout.write().await;
                            let was_in_blackout = guard.in_blackout;
                            if guard.recompute(cfg.blackout_enabled, cfg.start_hour, cfg.start_minute, cfg.end_hour, cfg.end_minute, minutes) {
                                let (from, to) = if was_in_blackout { ("BLACKOUT", "LIVE") } else { ("LIVE", "BLACKOUT") };
                                info!("blackout transition: {from} -> {to}");
                                events.publish(crate::telemetry::events::EngineEvent::ModeTransition {
                                    from: from.to_string(),
                                    to: to.to_string(),
                                    timestamp: chrono::Utc::now(),
                                });
                            }
                        }
                    }
                }
            });
        }

        // --- Telemetry loop: periodic PnL and latency summaries ---
        {
            let pnl = PnlTracker::new(store.clone());
            let latency = latency.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(TELEMETRY_LOG_INTERVAL);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => return,
                        _ = tick.tick() => {
                            pnl.log_summary().await;
                            latency.log_summary();
                        }
                    }
                }
            });
        }

        // --- Event forwarding: circuit-breaker trips and fills become alerts ---
        {
            let alerts = alerts.clone();
            let mut events_rx = events.subscribe();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => return,
                        event = events_rx.recv() => {
                            match event {
                                Ok(crate::telemetry::events::EngineEvent::CircuitBreakerTrip { realized_pnl, .. }) => {
                                    alerts.on_circuit_breaker_trip(realized_pnl).await;
                                }
                                Ok(crate::telemetry::events::EngineEvent::TradeExecuted { market_slug, expected_profit, .. }) => {
                                    alerts.on_trade(&format!("{market_slug} expected profit {expected_profit}")).await;
                                }
                                Ok(_) => {}
                                Err(_) => return,
                            }
                        }
                    }
                }
            });
        }

        info!("engine running, dry_run={}", config.strategy.dry_run);

        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received, draining tasks");
        let _ = shutdown_tx.send(());

        if let Err(e) = venue.cancel_all().await {
            error!("failed to cancel open orders on shutdown: {e}");
        }
        alerts.send("engine shutting down, all open orders cancelled").await;

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        info!("engine shutdown complete");
        Ok(())
    }
}
