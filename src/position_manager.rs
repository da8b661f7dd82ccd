//! Position Manager (spec.md §4.10): an in-memory registry of open
//! positions keyed by trade id, fed by the Executor on every non-zero
//! fill and kept current by Book Tracker state-change notifications.
//!
//! The registry is a deliberate extension point: the baseline engine
//! does not rebalance on post-fill market-price drift, it only tracks
//! positions until the Settlement Worker claims them.

use crate::book_tracker::StateChangeObserver;
use crate::models::market::MarketState;
use crate::models::position::Position;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

pub struct PositionManager {
    /// trade_id -> both legs' positions registered from that trade.
    open: DashMap<String, Vec<Position>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self { open: DashMap::new() }
    }

    pub fn register(&self, trade_id: &str, position: Position) {
        self.open.entry(trade_id.to_string()).or_default().push(position);
    }

    pub fn open_positions_for(&self, trade_id: &str) -> Vec<Position> {
        self.open.get(trade_id).map(|r| r.clone()).unwrap_or_default()
    }

    /// Drops a trade's tracked positions once every leg is claimed; called
    /// by the Settlement Worker after a successful redemption.
    pub fn retire_if_fully_claimed(&self, trade_id: &str) {
        let fully_claimed = self
            .open
            .get(trade_id)
            .map(|r| r.iter().all(|p| p.claimed))
            .unwrap_or(false);
        if fully_claimed {
            self.open.remove(trade_id);
        }
    }

    pub fn tracked_trade_count(&self) -> usize {
        self.open.len()
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Wires the registry into the Book Tracker's observer slot. Hedge-ratio
/// drift detection is not acted on in the baseline engine (spec.md §4.10);
/// this only logs so the extension point has somewhere to grow from.
pub struct PositionManagerObserver {
    manager: Arc<PositionManager>,
}

impl PositionManagerObserver {
    pub fn new(manager: Arc<PositionManager>) -> Self {
        Self { manager }
    }
}

impl StateChangeObserver for PositionManagerObserver {
    fn on_state_change(&self, state: &MarketState) {
        if self.manager.tracked_trade_count() == 0 {
            return;
        }
        debug!(
            market = %state.market.slug,
            combined_cost = %state.combined_cost(),
            "book state changed for a market with open positions"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{Asset, Side};
    use chrono::Utc;

    fn position(trade_id: &str, claimed: bool) -> Position {
        let mut p = Position::new(
            trade_id.into(),
            "cond".into(),
            "yes-token".into(),
            Side::Yes,
            "100".parse().unwrap(),
            "0.40".parse().unwrap(),
            Utc::now(),
            Asset::BTC,
        );
        if claimed {
            p.mark_claimed("100".parse().unwrap());
        }
        p
    }

    #[test]
    fn retires_only_when_every_leg_claimed() {
        let mgr = PositionManager::new();
        mgr.register("t1", position("t1", false));
        mgr.register("t1", position("t1", true));
        mgr.retire_if_fully_claimed("t1");
        assert_eq!(mgr.open_positions_for("t1").len(), 2);

        mgr.open.get_mut("t1").unwrap()[0].mark_claimed("100".parse().unwrap());
        mgr.retire_if_fully_claimed("t1");
        assert_eq!(mgr.tracked_trade_count(), 0);
    }
}
