use crate::models::order::OrderSide;
use crate::store::{PnlHistoryEntry, StatsSummary, Store};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Read-side P&L reporting, backed entirely by the Store (spec.md §4.2).
/// Holds no ledger of its own so there is nothing here to drift from the
/// durable numbers the Store tracks.
pub struct PnlTracker {
    store: Arc<dyn Store>,
}

impl PnlTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn today(&self) -> anyhow::Result<StatsSummary> {
        self.store.get_today_stats().await
    }

    pub async fn all_time(&self) -> anyhow::Result<StatsSummary> {
        self.store.get_all_time_stats().await
    }

    pub async fn history(&self, days: i64) -> anyhow::Result<Vec<PnlHistoryEntry>> {
        self.store.get_pnl_history(days).await
    }

    /// Logs a one-line fill event. Purely informational; the Store is the
    /// system of record and is written to separately by the executor.
    pub fn record_fill(&self, token_id: &str, price: Decimal, size: Decimal, side: OrderSide) {
        let side_str = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        info!(
            token_id = &token_id[..8.min(token_id.len())],
            side = side_str,
            %price,
            %size,
            "fill recorded"
        );
    }

    pub async fn log_summary(&self) {
        match self.store.get_today_stats().await {
            Ok(stats) => {
                let win_rate = if stats.total_trades > 0 {
                    stats.wins as f64 / stats.total_trades as f64 * 100.0
                } else {
                    0.0
                };
                info!(
                    trades = stats.total_trades,
                    wins = stats.wins,
                    losses = stats.losses,
                    pending = stats.pending,
                    total_pnl = %stats.total_pnl,
                    total_volume = %stats.total_volume,
                    win_rate,
                    "daily pnl summary"
                );
            }
            Err(e) => info!("pnl summary unavailable: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn today_reflects_an_empty_store() {
        let store = Arc::new(MemoryStore::new());
        let tracker = PnlTracker::new(store);
        let stats = tracker.today().await.unwrap();
        assert_eq!(stats.total_trades, 0);
    }
}
