//! Executor (spec.md §4.6/§4.11 C8 driver): the long-lived task that pops
//! opportunities off the queue, runs them through the Risk Gate and Sizer,
//! and drives the dual-leg primitive (or a simulated equivalent when the
//! process isn't in LIVE mode).

use crate::book_tracker::BookTracker;
use crate::models::circuit_breaker::CircuitBreakerState;
use crate::models::daily::DailyCounters;
use crate::models::market::Side;
use crate::models::opportunity::Opportunity;
use crate::models::order::OrderStatus;
use crate::models::position::Position;
use crate::models::trade::{ExecutionStatus, TradeRecord, TradeStatus};
use crate::opportunity_queue::OpportunityReceiver;
use crate::position_manager::PositionManager;
use crate::rebalancer::{RebalanceOutcome, RebalanceRequest, Rebalancer};
use crate::risk_gate::{RiskGate, RiskGateConfig, RiskGateContext};
use crate::sizer::{Sizer, SizerConfig};
use crate::store::{PnlType, Store};
use crate::telemetry::events::EngineEvent;
use crate::telemetry::{EventBus, LatencyTracker};
use crate::venue::dual_leg::{execute_dual_leg, DualLegOutcome, DualLegRequest};
use crate::venue::VenueAdapter;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

/// A hedged pair pays out exactly one collateral unit per matched share at
/// resolution, not one per leg, so profit is `matched_pairs - total_cost`
/// rather than `yes_filled + no_filled - total_cost`. Matches the simulated
/// path (`sized.pairs * spread`) and the Rebalancer's hedge/flatten
/// accounting (`filled_shares - total_cost`).
fn hedged_pair_profit(yes_filled: Decimal, yes_price: Decimal, no_filled: Decimal, no_price: Decimal) -> Decimal {
    let matched_pairs = yes_filled.min(no_filled);
    let total_cost = yes_filled * yes_price + no_filled * no_price;
    matched_pairs - total_cost
}

/// Which path an opportunity's execution takes (spec.md §4.11's mode
/// priority: BLACKOUT > CIRCUIT_BREAKER > DRY_RUN > LIVE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Live,
    DryRun,
    CircuitBreaker,
    Blackout,
}

impl TradingMode {
    pub fn select(in_blackout: bool, circuit_breaker_hit: bool, dry_run_config: bool) -> Self {
        if in_blackout {
            TradingMode::Blackout
        } else if circuit_breaker_hit {
            TradingMode::CircuitBreaker
        } else if dry_run_config {
            TradingMode::DryRun
        } else {
            TradingMode::Live
        }
    }

    pub fn is_simulated(&self) -> bool {
        !matches!(self, TradingMode::Live)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TradingMode::Live => "LIVE",
            TradingMode::DryRun => "DRY_RUN",
            TradingMode::CircuitBreaker => "CIRCUIT_BREAKER",
            TradingMode::Blackout => "BLACKOUT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DualLegTunables {
    pub buffer: Decimal,
    pub max_consumption_fraction: Decimal,
    pub min_hedge_ratio: Decimal,
    pub critical_hedge_ratio: Decimal,
    pub t_submit_secs: u64,
    pub t_live_secs: u64,
    pub slippage: Decimal,
}

pub struct Executor {
    book_tracker: Arc<BookTracker>,
    venue: Arc<dyn VenueAdapter>,
    store: Arc<dyn Store>,
    positions: Arc<PositionManager>,
    events: EventBus,
    latency: Arc<LatencyTracker>,
    circuit_breaker: Arc<RwLock<CircuitBreakerState>>,
    daily: Arc<RwLock<DailyCounters>>,
    dry_run_config: bool,
    risk_config: RiskGateConfig,
    sizer_config: SizerConfig,
    dual_leg: DualLegTunables,
}

impl Executor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        book_tracker: Arc<BookTracker>,
        venue: Arc<dyn VenueAdapter>,
        store: Arc<dyn Store>,
        positions: Arc<PositionManager>,
        events: EventBus,
        latency: Arc<LatencyTracker>,
        circuit_breaker: Arc<RwLock<CircuitBreakerState>>,
        daily: Arc<RwLock<DailyCounters>>,
        dry_run_config: bool,
        risk_config: RiskGateConfig,
        sizer_config: SizerConfig,
        dual_leg: DualLegTunables,
    ) -> Self {
        Self {
            book_tracker,
            venue,
            store,
            positions,
            events,
            latency,
            circuit_breaker,
            daily,
            dry_run_config,
            risk_config,
            sizer_config,
            dual_leg,
        }
    }

    pub async fn run(&self, mut receiver: OpportunityReceiver, mut shutdown: broadcast::Receiver<()>, mut in_blackout: impl FnMut() -> bool) {
        loop {
            let opportunity = tokio::select! {
                _ = shutdown.recv() => {
                    info!("executor shutting down");
                    return;
                }
                popped = receiver.pop_valid() => popped,
            };

            let Some(opportunity) = opportunity else {
                continue;
            };

            self.handle_opportunity(opportunity, in_blackout()).await;
        }
    }

    async fn handle_opportunity(&self, opportunity: Opportunity, in_blackout: bool) {
        let breaker = self.circuit_breaker.read().await.clone();
        let mode = TradingMode::select(in_blackout, breaker.hit, self.dry_run_config);

        // When the mode is already non-LIVE the reason is the mode itself,
        // not a redundant risk-gate rejection; present a clean breaker and
        // blackout flag so the gate only screens on substantive terms.
        let gate_breaker = if mode == TradingMode::Live { breaker.clone() } else { CircuitBreakerState::default() };
        let gate_in_blackout = mode == TradingMode::Live && in_blackout;

        let daily_exposure = self.daily.read().await.exposure;
        let available_budget = match self.venue.get_balance().await {
            Ok(b) => b,
            Err(e) => {
                warn!("executor: failed to read balance: {e}, using configured cap");
                self.risk_config.max_daily_exposure
            }
        };

        let ctx = RiskGateContext {
            config: &self.risk_config,
            daily_exposure,
            circuit_breaker: &gate_breaker,
            in_blackout: gate_in_blackout,
            available_budget,
        };
        let decision = RiskGate::evaluate(&opportunity, &ctx);

        self.events.publish(EngineEvent::TradeDecision {
            market_slug: decision.market_slug.clone(),
            approved: decision.approved,
            reason: decision.reason.clone(),
            spread: decision.spread,
            timestamp: chrono::Utc::now(),
        });

        if !decision.approved {
            let mut daily = self.daily.write().await;
            daily.opportunities_skipped += 1;
            return;
        }

        let Some(state) = self.book_tracker.state_for(&opportunity.market.condition_id) else {
            warn!("executor: no book state for {}, skipping", opportunity.market.slug);
            return;
        };
        let yes_depth = state.yes_book.top_n_ask_depth(3);
        let no_depth = state.no_book.top_n_ask_depth(3);

        let Some(sized) = Sizer::size(
            &self.sizer_config,
            available_budget.min(self.risk_config.max_daily_exposure - daily_exposure),
            opportunity.yes_price,
            opportunity.no_price,
            yes_depth,
            no_depth,
        ) else {
            let mut daily = self.daily.write().await;
            daily.opportunities_skipped += 1;
            return;
        };

        let trade = if mode.is_simulated() {
            self.execute_simulated(&opportunity, &sized, mode)
        } else {
            self.execute_live(&opportunity, &sized, &state.yes_book, &state.no_book).await
        };

        if let Err(e) = self.store.save_trade(&trade).await {
            warn!("failed to persist trade {}: {e}", trade.trade_id);
        }

        self.events.publish(EngineEvent::TradeExecuted {
            trade_id: trade.trade_id.clone(),
            market_slug: trade.market_slug.clone(),
            yes_status: trade.yes_order_status,
            no_status: trade.no_order_status,
            expected_profit: trade.expected_profit,
            timestamp: chrono::Utc::now(),
        });

        let mut daily = self.daily.write().await;
        daily.opportunities_executed += 1;
        daily.exposure += trade.intended_yes_cost + trade.intended_no_cost;
    }

    fn execute_simulated(&self, opportunity: &Opportunity, sized: &crate::sizer::SizedTrade, mode: TradingMode) -> TradeRecord {
        info!(mode = mode.label(), market = %opportunity.market.slug, "simulating trade");
        TradeRecord {
            trade_id: TradeRecord::new_id(),
            condition_id: opportunity.market.condition_id.clone(),
            asset: opportunity.market.asset,
            market_slug: opportunity.market.slug.clone(),
            market_end_time: opportunity.market.end_time,
            intended_yes_price: opportunity.yes_price,
            intended_no_price: opportunity.no_price,
            intended_yes_cost: sized.yes_usd,
            intended_no_cost: sized.no_usd,
            yes_shares: sized.pairs,
            no_shares: sized.pairs,
            yes_order_status: OrderStatus::Simulated,
            no_order_status: OrderStatus::Simulated,
            execution_status: ExecutionStatus::FullFill,
            expected_profit: sized.pairs * opportunity.spread,
            actual_profit: None,
            status: TradeStatus::Pending,
            dry_run: true,
            pre_fill_yes_depth: None,
            pre_fill_no_depth: None,
            created_at: chrono::Utc::now(),
        }
    }

    async fn execute_live(
        &self,
        opportunity: &Opportunity,
        sized: &crate::sizer::SizedTrade,
        yes_book: &crate::models::market::OrderBook,
        no_book: &crate::models::market::OrderBook,
    ) -> TradeRecord {
        let req = DualLegRequest {
            yes_token_id: opportunity.market.yes_token_id.clone(),
            no_token_id: opportunity.market.no_token_id.clone(),
            yes_price: opportunity.yes_price,
            no_price: opportunity.no_price,
            yes_shares: sized.pairs,
            no_shares: sized.pairs,
            buffer: self.dual_leg.buffer,
            max_consumption_fraction: self.dual_leg.max_consumption_fraction,
            min_hedge_ratio: self.dual_leg.min_hedge_ratio,
            critical_hedge_ratio: self.dual_leg.critical_hedge_ratio,
            t_submit_secs: self.dual_leg.t_submit_secs,
            t_live_secs: self.dual_leg.t_live_secs,
        };

        let timer = self.latency.start_timer("dual_leg_execute");
        let outcome = execute_dual_leg(self.venue.as_ref(), &req, yes_book, no_book).await;
        drop(timer);

        let pre_fill_yes_depth = yes_book.top_n_ask_depth(3);
        let pre_fill_no_depth = no_book.top_n_ask_depth(3);
        if let Err(e) = self
            .store
            .save_liquidity_snapshot(&opportunity.market.condition_id, pre_fill_yes_depth, pre_fill_no_depth)
            .await
        {
            warn!("failed to save liquidity snapshot: {e}");
        }

        let trade_id = TradeRecord::new_id();
        let base = |execution_status, yes_status, no_status, yes_shares, no_shares, expected_profit| TradeRecord {
            trade_id: trade_id.clone(),
            condition_id: opportunity.market.condition_id.clone(),
            asset: opportunity.market.asset,
            market_slug: opportunity.market.slug.clone(),
            market_end_time: opportunity.market.end_time,
            intended_yes_price: opportunity.yes_price,
            intended_no_price: opportunity.no_price,
            intended_yes_cost: sized.yes_usd,
            intended_no_cost: sized.no_usd,
            yes_shares,
            no_shares,
            yes_order_status: yes_status,
            no_order_status: no_status,
            execution_status,
            expected_profit,
            actual_profit: None,
            status: TradeStatus::Pending,
            dry_run: false,
            pre_fill_yes_depth: Some(pre_fill_yes_depth),
            pre_fill_no_depth: Some(pre_fill_no_depth),
            created_at: chrono::Utc::now(),
        };

        match outcome {
            Ok(DualLegOutcome::Success { yes_fill, no_fill, .. }) => {
                let trade = base(
                    ExecutionStatus::FullFill,
                    yes_fill.status,
                    no_fill.status,
                    yes_fill.filled_size,
                    no_fill.filled_size,
                    hedged_pair_profit(yes_fill.filled_size, yes_fill.avg_fill_price, no_fill.filled_size, no_fill.avg_fill_price),
                );
                self.register_positions(&trade, (&opportunity.market.yes_token_id, yes_fill.filled_size, yes_fill.avg_fill_price), (&opportunity.market.no_token_id, no_fill.filled_size, no_fill.avg_fill_price)).await;
                self.record_fill_slippage(&trade_id, &opportunity.market.yes_token_id, opportunity.yes_price, yes_fill.avg_fill_price).await;
                self.record_fill_slippage(&trade_id, &opportunity.market.no_token_id, opportunity.no_price, no_fill.avg_fill_price).await;
                trade
            }
            Ok(DualLegOutcome::PartialFill { filled_side, filled_result, unfilled_price }) => {
                self.handle_partial_fill(opportunity, &trade_id, filled_side, filled_result, unfilled_price, base).await
            }
            Ok(DualLegOutcome::Rejected { reason }) => {
                warn!("dual-leg rejected for {}: {reason}", opportunity.market.slug);
                base(ExecutionStatus::Failed, OrderStatus::Failed, OrderStatus::Failed, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
            }
            Err(e) => {
                warn!("dual-leg execution error for {}: {e}", opportunity.market.slug);
                base(ExecutionStatus::Failed, OrderStatus::Exception, OrderStatus::Exception, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
            }
        }
    }

    async fn handle_partial_fill(
        &self,
        opportunity: &Opportunity,
        trade_id: &str,
        filled_side: Side,
        filled_result: crate::models::order::OrderResult,
        unfilled_price: Decimal,
        base: impl Fn(ExecutionStatus, OrderStatus, OrderStatus, Decimal, Decimal, Decimal) -> TradeRecord,
    ) -> TradeRecord {
        let state = self.book_tracker.state_for(&opportunity.market.condition_id);
        let (unfilled_token_id, unfilled_best_ask, filled_best_bid) = match filled_side {
            Side::Yes => (
                opportunity.market.no_token_id.clone(),
                state.as_ref().and_then(|s| s.no_book.best_ask()),
                state.as_ref().and_then(|s| s.yes_book.best_bid()),
            ),
            Side::No => (
                opportunity.market.yes_token_id.clone(),
                state.as_ref().and_then(|s| s.yes_book.best_ask()),
                state.as_ref().and_then(|s| s.no_book.best_bid()),
            ),
        };
        // Fall back to the opportunity's cached price if the book lookup
        // raced the fill (state removed/replaced mid-flight).
        let unfilled_best_ask = unfilled_best_ask.or(Some((unfilled_price, filled_result.filled_size)));

        let req = RebalanceRequest {
            filled_token_id: filled_result.token_id.clone(),
            unfilled_token_id: unfilled_token_id.clone(),
            filled_side,
            filled_shares: filled_result.filled_size,
            filled_price: filled_result.avg_fill_price,
            slippage: self.dual_leg.slippage,
        };

        let outcome = Rebalancer::run(self.venue.as_ref(), &req, unfilled_best_ask, filled_best_bid).await;
        let trade = match outcome {
            RebalanceOutcome::Hedged { buy_price, expected_profit, .. } => {
                let trade = base(
                    ExecutionStatus::FullFill,
                    OrderStatus::Matched,
                    OrderStatus::Matched,
                    filled_result.filled_size,
                    filled_result.filled_size,
                    expected_profit,
                );
                let filled_leg = (filled_result.token_id.as_str(), filled_result.filled_size, filled_result.avg_fill_price);
                let hedged_leg = (unfilled_token_id.as_str(), filled_result.filled_size, buy_price);
                match filled_side {
                    Side::Yes => self.register_positions(&trade, filled_leg, hedged_leg).await,
                    Side::No => self.register_positions(&trade, hedged_leg, filled_leg).await,
                }
                trade
            }
            RebalanceOutcome::Flattened { pnl, .. } => {
                if let Ok(breaker) = self.store.record_realized_pnl(trade_id, pnl, PnlType::RebalancerExit, self.risk_config.max_daily_loss).await {
                    let mut guard = self.circuit_breaker.write().await;
                    *guard = breaker.clone();
                    if breaker.hit {
                        self.events.publish(EngineEvent::CircuitBreakerTrip {
                            realized_pnl: breaker.realized_pnl,
                            reason: breaker.hit_reason.clone().unwrap_or_default(),
                            timestamp: chrono::Utc::now(),
                        });
                    }
                }
                let mut trade = base(
                    ExecutionStatus::PartialFill,
                    OrderStatus::Failed,
                    OrderStatus::Failed,
                    Decimal::ZERO,
                    Decimal::ZERO,
                    pnl,
                );
                trade.status = TradeStatus::Loss;
                trade.actual_profit = Some(pnl);
                trade
            }
            RebalanceOutcome::ExitFailed => {
                let mut trade = base(
                    ExecutionStatus::OneLegOnly,
                    filled_result.status,
                    OrderStatus::Failed,
                    filled_result.filled_size,
                    Decimal::ZERO,
                    Decimal::ZERO,
                );
                trade.status = TradeStatus::Pending;
                let filled_leg = (filled_result.token_id.as_str(), filled_result.filled_size, filled_result.avg_fill_price);
                let empty_leg = ("", Decimal::ZERO, Decimal::ZERO);
                match filled_side {
                    Side::Yes => self.register_positions(&trade, filled_leg, empty_leg).await,
                    Side::No => self.register_positions(&trade, empty_leg, filled_leg).await,
                }
                trade
            }
        };
        trade
    }

    async fn register_positions(&self, trade: &TradeRecord, yes_leg: (&str, Decimal, Decimal), no_leg: (&str, Decimal, Decimal)) {
        let (yes_token_id, yes_shares, yes_price) = yes_leg;
        let (no_token_id, no_shares, no_price) = no_leg;
        if yes_shares > Decimal::ZERO {
            let pos = Position::new(
                trade.trade_id.clone(),
                trade.condition_id.clone(),
                yes_token_id.to_string(),
                Side::Yes,
                yes_shares,
                yes_price,
                trade.market_end_time,
                trade.asset,
            );
            self.positions.register(&trade.trade_id, pos.clone());
            let _ = self.store.add_to_settlement_queue(&pos).await;
        }
        if no_shares > Decimal::ZERO {
            let pos = Position::new(
                trade.trade_id.clone(),
                trade.condition_id.clone(),
                no_token_id.to_string(),
                Side::No,
                no_shares,
                no_price,
                trade.market_end_time,
                trade.asset,
            );
            self.positions.register(&trade.trade_id, pos.clone());
            let _ = self.store.add_to_settlement_queue(&pos).await;
        }
    }

    /// Records fill slippage in basis points relative to the intended price,
    /// feeding the Store's slippage telemetry (spec.md §4.2 optional ops).
    async fn record_fill_slippage(&self, trade_id: &str, token_id: &str, intended_price: Decimal, avg_fill_price: Decimal) {
        if intended_price <= Decimal::ZERO {
            return;
        }
        let slippage_bps = (avg_fill_price - intended_price) / intended_price * Decimal::from(10_000);
        if let Err(e) = self.store.save_fill_record(trade_id, token_id, slippage_bps).await {
            warn!("failed to save fill record: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hedged_pair_profit_matches_spec_scenario_one() {
        use rust_decimal_macros::dec;
        // 10.53 pairs at yes=0.40, no=0.55: total_cost = 10.53 * 0.95 = 10.0035
        let profit = hedged_pair_profit(dec!(10.53), dec!(0.40), dec!(10.53), dec!(0.55));
        assert_eq!(profit, dec!(0.5265));
    }

    #[test]
    fn hedged_pair_profit_uses_matched_pairs_not_sum_of_legs() {
        use rust_decimal_macros::dec;
        let profit = hedged_pair_profit(dec!(10), dec!(0.40), dec!(10), dec!(0.55));
        assert_eq!(profit, dec!(0.50), "profit should be pairs - cost, not 2*pairs - cost");
    }

    #[test]
    fn mode_priority_blackout_beats_everything() {
        assert_eq!(TradingMode::select(true, true, true), TradingMode::Blackout);
    }

    #[test]
    fn mode_priority_circuit_breaker_beats_dry_run() {
        assert_eq!(TradingMode::select(false, true, true), TradingMode::CircuitBreaker);
    }

    #[test]
    fn mode_defaults_to_live() {
        assert_eq!(TradingMode::select(false, false, false), TradingMode::Live);
        assert!(!TradingMode::Live.is_simulated());
    }
}
