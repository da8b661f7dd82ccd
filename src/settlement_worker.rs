//! Settlement Worker (spec.md §4.10): a 60-second interval task that
//! cancels stale resting orders, then walks the Store's claimable
//! positions and redeems them on-chain.

use crate::models::position::Position;
use crate::store::{PnlType, Store};
use crate::venue::settlement::SettlementClient;
use crate::venue::VenueAdapter;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub const SETTLEMENT_INTERVAL: Duration = Duration::from_secs(60);
pub const CLAIM_WAIT_MINUTES: i64 = 10;
pub const MAX_CLAIM_ATTEMPTS: u32 = 5;

pub struct SettlementWorker {
    store: Arc<dyn Store>,
    venue: Arc<dyn VenueAdapter>,
    settlement: Arc<SettlementClient>,
    max_daily_loss: Decimal,
}

impl SettlementWorker {
    pub fn new(
        store: Arc<dyn Store>,
        venue: Arc<dyn VenueAdapter>,
        settlement: Arc<SettlementClient>,
        max_daily_loss: Decimal,
    ) -> Self {
        Self { store, venue, settlement, max_daily_loss }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>, active_condition_ids: impl Fn() -> HashSet<String>) {
        let mut ticker = tokio::time::interval(SETTLEMENT_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("settlement worker shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.cancel_stale_orders(&active_condition_ids()).await;
                    self.run_settlement_pass().await;
                }
            }
        }
    }

    async fn cancel_stale_orders(&self, active_condition_ids: &HashSet<String>) {
        let open_orders = match self.venue.get_open_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!("settlement worker: failed to list open orders: {e}");
                return;
            }
        };
        for order in open_orders {
            // Token ids don't carry condition ids; this relies on the
            // engine's active-market set still resolving them. Orders for
            // markets no longer tracked are cancelled defensively.
            if !active_condition_ids.contains(&order.token_id) {
                if let Err(e) = self.venue.cancel(&order.order_id).await {
                    warn!("failed to cancel stale order {}: {e}", order.order_id);
                }
            }
        }
    }

    async fn run_settlement_pass(&self) {
        let claimable = match self.store.get_claimable_positions(CLAIM_WAIT_MINUTES).await {
            Ok(p) => p,
            Err(e) => {
                error!("settlement worker: failed to load claimable positions: {e}");
                return;
            }
        };

        let mut by_condition: HashMap<String, Vec<Position>> = HashMap::new();
        for position in claimable {
            if position.failed_attempts >= MAX_CLAIM_ATTEMPTS {
                continue;
            }
            by_condition.entry(position.condition_id.clone()).or_default().push(position);
        }

        for (condition_id, positions) in by_condition {
            // Redeem once per condition: the contract call settles both
            // outcome slots in a single transaction regardless of how many
            // of our own positions reference it.
            let redeem_result = match self.settlement.redeem_positions(&condition_id).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("redeem failed for condition {condition_id}: {e}");
                    for position in &positions {
                        if let Err(store_err) =
                            self.store.record_claim_attempt(&position.trade_id, &position.token_id, &e.to_string()).await
                        {
                            error!("failed to record claim attempt: {store_err}");
                        }
                    }
                    continue;
                }
            };

            let winning_side = match self.settlement.winning_side(&condition_id).await {
                Ok(side) => side,
                Err(e) => {
                    error!("could not determine winning side for condition {condition_id} after redeem tx {}: {e}", redeem_result.tx_hash);
                    continue;
                }
            };

            for position in positions {
                let (proceeds, profit) = if position.side == winning_side {
                    (position.shares, position.shares - position.entry_cost)
                } else {
                    (Decimal::ZERO, -position.entry_cost)
                };

                if let Err(e) = self
                    .store
                    .mark_position_claimed(&position.trade_id, &position.token_id, proceeds, profit)
                    .await
                {
                    error!("failed to mark position claimed after redeem tx {}: {e}", redeem_result.tx_hash);
                    continue;
                }

                match self.store.record_realized_pnl(&position.trade_id, profit, PnlType::TradeSettlement, self.max_daily_loss).await {
                    Ok(breaker) if breaker.hit => {
                        error!(critical = true, "circuit breaker tripped by settlement pnl: {}", breaker.realized_pnl);
                    }
                    Ok(_) => {}
                    Err(e) => error!("failed to record realized pnl: {e}"),
                }

                info!(
                    trade_id = %position.trade_id, side = ?position.side, proceeds = %proceeds, profit = %profit,
                    "position redeemed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{Asset, Side};
    use crate::models::position::Position;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn claimable_positions_below_retry_cap_are_returned() {
        let store = MemoryStore::new();
        let mut position = Position::new(
            "t1".into(),
            "cond".into(),
            "yes".into(),
            Side::Yes,
            dec!(100),
            dec!(0.40),
            Utc::now() - chrono::Duration::minutes(20),
            Asset::BTC,
        );
        position.failed_attempts = 2;
        store.add_to_settlement_queue(&position).await.unwrap();

        let claimable = store.get_claimable_positions(CLAIM_WAIT_MINUTES).await.unwrap();
        assert_eq!(claimable.len(), 1);
        assert!(claimable[0].failed_attempts < MAX_CLAIM_ATTEMPTS);
    }
}
