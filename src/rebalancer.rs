//! Rebalancer (spec.md §4.7): invoked when the Executor's dual-leg
//! primitive fills exactly one leg. Tries to complete the hedge at a
//! still-profitable price; if that fails, flattens the filled leg at
//! best bid and accepts the loss. Never leaves a position unhedged on
//! purpose.

use crate::models::market::Side;
use crate::models::order::{OrderIntent, OrderSide, TimeInForce};
use crate::venue::VenueAdapter;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tracing::{error, info, warn};

const LIVE_WAIT: Duration = Duration::from_secs(2);
const MAX_BUY_PRICE: Decimal = dec!(0.99);
const MIN_SELL_PRICE: Decimal = dec!(0.01);
const COMBINED_COST_TOLERANCE: Decimal = dec!(0.02);
const MIN_DEPTH_FRACTION: Decimal = dec!(0.5);

pub struct RebalanceRequest {
    pub filled_token_id: String,
    pub unfilled_token_id: String,
    pub filled_side: Side,
    pub filled_shares: Decimal,
    pub filled_price: Decimal,
    pub slippage: Decimal,
}

#[derive(Debug, Clone)]
pub enum RebalanceOutcome {
    /// Hedge completed: the position is now a full arbitrage pair.
    Hedged { buy_price: Decimal, total_cost: Decimal, expected_profit: Decimal },
    /// Flattened the filled leg at a loss; no open position remains.
    Flattened { sell_price: Decimal, proceeds: Decimal, pnl: Decimal },
    /// Neither step completed; the original position is still held.
    ExitFailed,
}

pub struct Rebalancer;

impl Rebalancer {
    pub async fn run(
        venue: &dyn VenueAdapter,
        req: &RebalanceRequest,
        unfilled_best_ask: Option<(Decimal, Decimal)>,
        filled_best_bid: Option<(Decimal, Decimal)>,
    ) -> RebalanceOutcome {
        if let Some(outcome) = Self::complete_hedge(venue, req, unfilled_best_ask).await {
            return outcome;
        }
        Self::flatten(venue, req, filled_best_bid).await
    }

    /// Step 1: buy the unfilled side at a still-profitable price. Returns
    /// `None` (not `ExitFailed`) when preconditions aren't met or the hedge
    /// order never matches, so the caller falls through to Step 2.
    async fn complete_hedge(
        venue: &dyn VenueAdapter,
        req: &RebalanceRequest,
        unfilled_best_ask: Option<(Decimal, Decimal)>,
    ) -> Option<RebalanceOutcome> {
        let (best_ask, ask_size) = unfilled_best_ask?;
        let buy_price = (best_ask + req.slippage).min(MAX_BUY_PRICE);

        if req.filled_price + buy_price >= Decimal::ONE + COMBINED_COST_TOLERANCE {
            info!("rebalancer: hedge no longer profitable enough, falling through to flatten");
            return None;
        }
        if ask_size < MIN_DEPTH_FRACTION * req.filled_shares {
            info!("rebalancer: insufficient depth to hedge, falling through to flatten");
            return None;
        }

        let intent = OrderIntent {
            token_id: req.unfilled_token_id.clone(),
            market_side: req.filled_side.opposite(),
            order_side: OrderSide::Buy,
            price: buy_price,
            size: req.filled_shares,
            time_in_force: TimeInForce::GTC,
        };

        let result = match venue.place_order(&intent).await {
            Ok(r) => r,
            Err(e) => {
                warn!("rebalancer hedge submit failed: {e}");
                return None;
            }
        };

        let result = if result.status.is_live() {
            tokio::time::sleep(LIVE_WAIT).await;
            match venue.get_order(&result.order_id).await {
                Ok(r) => r,
                Err(_) => result,
            }
        } else {
            result
        };

        if result.status.is_filled() {
            let total_cost = req.filled_price * req.filled_shares + result.avg_fill_price * result.filled_size;
            let expected_profit = req.filled_shares - total_cost;
            info!(expected_profit = %expected_profit, "rebalancer completed hedge");
            return Some(RebalanceOutcome::Hedged { buy_price: result.avg_fill_price, total_cost, expected_profit });
        }

        if result.status.is_live() {
            let _ = venue.cancel(&result.order_id).await;
        }
        None
    }

    /// Step 2: flatten the filled leg at best bid, accepting a bounded loss.
    async fn flatten(
        venue: &dyn VenueAdapter,
        req: &RebalanceRequest,
        filled_best_bid: Option<(Decimal, Decimal)>,
    ) -> RebalanceOutcome {
        let Some((best_bid, _)) = filled_best_bid else {
            error!("rebalancer: no bid to flatten against, position held");
            return RebalanceOutcome::ExitFailed;
        };
        let sell_price = (best_bid - req.slippage).max(MIN_SELL_PRICE);

        let intent = OrderIntent {
            token_id: req.filled_token_id.clone(),
            market_side: req.filled_side,
            order_side: OrderSide::Sell,
            price: sell_price,
            size: req.filled_shares,
            time_in_force: TimeInForce::GTC,
        };

        let result = match venue.place_order(&intent).await {
            Ok(r) => r,
            Err(e) => {
                error!("rebalancer flatten submit failed: {e}, position held");
                return RebalanceOutcome::ExitFailed;
            }
        };

        let result = if result.status.is_live() {
            tokio::time::sleep(LIVE_WAIT).await;
            match venue.get_order(&result.order_id).await {
                Ok(r) => r,
                Err(_) => result,
            }
        } else {
            result
        };

        if result.status.is_filled() {
            let proceeds = result.avg_fill_price * result.filled_size;
            let filled_cost = req.filled_price * req.filled_shares;
            let pnl = proceeds - filled_cost;
            warn!(pnl = %pnl, "rebalancer flattened position at a loss");
            return RebalanceOutcome::Flattened { sell_price: result.avg_fill_price, proceeds, pnl };
        }

        if result.status.is_live() {
            let _ = venue.cancel(&result.order_id).await;
        }
        error!("rebalancer: flatten never matched, exit failed, position held");
        RebalanceOutcome::ExitFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::OrderBook;
    use crate::models::order::OrderResult;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockVenue {
        fill_on_submit: bool,
        calls: AtomicUsize,
    }

    fn mock_result(status: OrderStatus, price: Decimal, size: Decimal) -> OrderResult {
        OrderResult {
            order_id: "mock-order".into(),
            token_id: "token".into(),
            status,
            filled_size: if status.is_filled() { size } else { Decimal::ZERO },
            avg_fill_price: price,
            intended_size: size,
            intended_price: price,
            submitted_at: Utc::now(),
            error_msg: None,
        }
    }

    #[async_trait]
    impl VenueAdapter for MockVenue {
        async fn get_order_book(&self, token_id: &str) -> anyhow::Result<OrderBook> {
            Ok(OrderBook::new(token_id.to_string()))
        }
        async fn get_price(&self, _token_id: &str, _side: &str) -> anyhow::Result<Decimal> {
            Ok(Decimal::ZERO)
        }
        async fn get_balance(&self) -> anyhow::Result<Decimal> {
            Ok(Decimal::ZERO)
        }
        async fn place_order(&self, intent: &OrderIntent) -> anyhow::Result<OrderResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = if self.fill_on_submit { OrderStatus::Matched } else { OrderStatus::Live };
            Ok(mock_result(status, intent.price, intent.size))
        }
        async fn get_order(&self, _order_id: &str) -> anyhow::Result<OrderResult> {
            Ok(mock_result(OrderStatus::Live, dec!(0.50), dec!(100)))
        }
        async fn get_open_orders(&self) -> anyhow::Result<Vec<OrderResult>> {
            Ok(vec![])
        }
        async fn cancel(&self, _order_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn cancel_all(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn request() -> RebalanceRequest {
        RebalanceRequest {
            filled_token_id: "yes".into(),
            unfilled_token_id: "no".into(),
            filled_side: Side::Yes,
            filled_shares: dec!(100),
            filled_price: dec!(0.40),
            slippage: dec!(0.01),
        }
    }

    #[tokio::test]
    async fn completes_hedge_when_still_profitable_and_deep_enough() {
        let venue = MockVenue { fill_on_submit: true, calls: AtomicUsize::new(0) };
        let outcome = Rebalancer::run(&venue, &request(), Some((dec!(0.50), dec!(100))), None).await;
        assert!(matches!(outcome, RebalanceOutcome::Hedged { .. }));
    }

    #[tokio::test]
    async fn falls_through_to_flatten_when_combined_cost_too_high() {
        let venue = MockVenue { fill_on_submit: true, calls: AtomicUsize::new(0) };
        // best_ask 0.70 + filled_price 0.40 = 1.10, way past tolerance.
        let outcome = Rebalancer::run(&venue, &request(), Some((dec!(0.70), dec!(100))), Some((dec!(0.35), dec!(100)))).await;
        assert!(matches!(outcome, RebalanceOutcome::Flattened { .. }));
    }

    #[tokio::test]
    async fn exit_failed_when_no_bid_available_to_flatten_against() {
        let venue = MockVenue { fill_on_submit: true, calls: AtomicUsize::new(0) };
        let outcome = Rebalancer::run(&venue, &request(), None, None).await;
        assert!(matches!(outcome, RebalanceOutcome::ExitFailed));
    }
}
