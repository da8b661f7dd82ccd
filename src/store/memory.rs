use super::{PnlHistoryEntry, PnlType, StatsSummary, Store};
use crate::models::circuit_breaker::CircuitBreakerState;
use crate::models::daily::DailyCounters;
use crate::models::position::Position;
use crate::models::trade::{TradeRecord, TradeStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory `Store` for tests and dry-run-only deployments without a
/// database file. Mirrors `SqliteStore`'s semantics exactly; no query
/// language involved, just `Vec`/`HashMap` scans.
#[derive(Default)]
pub struct MemoryStore {
    trades: Mutex<Vec<TradeRecord>>,
    positions: Mutex<Vec<Position>>,
    daily: Mutex<HashMap<NaiveDate, DailyCounters>>,
    breaker: Mutex<CircuitBreakerState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_trade(&self, trade: &TradeRecord) -> Result<()> {
        self.trades.lock().unwrap().push(trade.clone());
        Ok(())
    }

    async fn resolve_trade(&self, trade_id: &str, won: bool, actual_profit: Decimal) -> Result<()> {
        let mut trades = self.trades.lock().unwrap();
        if let Some(t) = trades.iter_mut().find(|t| t.trade_id == trade_id) {
            t.status = if won { TradeStatus::Win } else { TradeStatus::Loss };
            t.actual_profit = Some(actual_profit);
        }
        Ok(())
    }

    async fn add_to_settlement_queue(&self, position: &Position) -> Result<()> {
        self.positions.lock().unwrap().push(position.clone());
        Ok(())
    }

    async fn mark_position_claimed(
        &self,
        trade_id: &str,
        token_id: &str,
        proceeds: Decimal,
        _profit: Decimal,
    ) -> Result<()> {
        let mut positions = self.positions.lock().unwrap();
        if let Some(p) = positions.iter_mut().find(|p| p.trade_id == trade_id && p.token_id == token_id) {
            p.mark_claimed(proceeds);
        }
        Ok(())
    }

    async fn record_claim_attempt(&self, trade_id: &str, token_id: &str, _error: &str) -> Result<()> {
        let mut positions = self.positions.lock().unwrap();
        if let Some(p) = positions.iter_mut().find(|p| p.trade_id == trade_id && p.token_id == token_id) {
            p.record_failed_attempt();
        }
        Ok(())
    }

    async fn get_claimable_positions(&self, wait_minutes: i64) -> Result<Vec<Position>> {
        let now = chrono::Utc::now();
        Ok(self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_claimable(now, wait_minutes))
            .cloned()
            .collect())
    }

    async fn get_unclaimed_positions(&self) -> Result<Vec<Position>> {
        Ok(self.positions.lock().unwrap().iter().filter(|p| !p.claimed).cloned().collect())
    }

    async fn update_daily_stats(&self, date: Option<NaiveDate>, delta: &DailyCounters) -> Result<()> {
        let date = date.unwrap_or(delta.date);
        let mut daily = self.daily.lock().unwrap();
        let entry = daily.entry(date).or_insert_with(|| {
            let mut d = DailyCounters::new_for_today();
            d.date = date;
            d
        });
        entry.pnl += delta.pnl;
        entry.trades += delta.trades;
        entry.wins += delta.wins;
        entry.losses += delta.losses;
        entry.exposure += delta.exposure;
        entry.opportunities_detected += delta.opportunities_detected;
        entry.opportunities_executed += delta.opportunities_executed;
        entry.opportunities_skipped += delta.opportunities_skipped;
        Ok(())
    }

    async fn record_realized_pnl(
        &self,
        _trade_id: &str,
        amount: Decimal,
        _pnl_type: PnlType,
        max_daily_loss: Decimal,
    ) -> Result<CircuitBreakerState> {
        let mut breaker = self.breaker.lock().unwrap();
        breaker.record_realized_pnl(amount, max_daily_loss);
        Ok(breaker.clone())
    }

    async fn get_circuit_breaker_state(&self) -> Result<CircuitBreakerState> {
        Ok(self.breaker.lock().unwrap().clone())
    }

    async fn reset_circuit_breaker(&self) -> Result<()> {
        self.breaker.lock().unwrap().reset();
        Ok(())
    }

    async fn get_today_stats(&self) -> Result<StatsSummary> {
        self.stats_for(|t| t.created_at.date_naive() == chrono::Utc::now().date_naive())
    }

    async fn get_all_time_stats(&self) -> Result<StatsSummary> {
        self.stats_for(|_| true)
    }

    async fn get_recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>> {
        let trades = self.trades.lock().unwrap();
        let mut sorted: Vec<TradeRecord> = trades.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted.truncate(limit.max(0) as usize);
        Ok(sorted)
    }

    async fn get_pnl_history(&self, days: i64) -> Result<Vec<PnlHistoryEntry>> {
        let daily = self.daily.lock().unwrap();
        let cutoff = chrono::Utc::now().date_naive() - chrono::Duration::days(days);
        let mut out: Vec<PnlHistoryEntry> = daily
            .values()
            .filter(|d| d.date >= cutoff)
            .map(|d| PnlHistoryEntry { date: d.date, pnl: d.pnl })
            .collect();
        out.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(out)
    }
}

impl MemoryStore {
    fn stats_for(&self, filter: impl Fn(&TradeRecord) -> bool) -> Result<StatsSummary> {
        let trades = self.trades.lock().unwrap();
        let mut summary = StatsSummary::default();
        for t in trades.iter().filter(|t| filter(t)) {
            summary.total_trades += 1;
            match t.status {
                TradeStatus::Win => summary.wins += 1,
                TradeStatus::Loss => summary.losses += 1,
                TradeStatus::Pending => summary.pending += 1,
            }
            if let Some(profit) = t.actual_profit {
                summary.total_pnl += profit;
                summary.best_trade = Some(summary.best_trade.map_or(profit, |b| b.max(profit)));
                summary.worst_trade = Some(summary.worst_trade.map_or(profit, |w| w.min(profit)));
            }
            summary.total_volume += t.intended_yes_cost + t.intended_no_cost;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Asset;
    use crate::models::trade::ExecutionStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_trade() -> TradeRecord {
        TradeRecord {
            trade_id: TradeRecord::new_id(),
            condition_id: "cond".into(),
            asset: Asset::BTC,
            market_slug: "btc-updown-15m-1".into(),
            market_end_time: Utc::now(),
            intended_yes_price: dec!(0.40),
            intended_no_price: dec!(0.55),
            intended_yes_cost: dec!(40.00),
            intended_no_cost: dec!(55.00),
            yes_shares: dec!(100),
            no_shares: dec!(100),
            yes_order_status: crate::models::order::OrderStatus::Matched,
            no_order_status: crate::models::order::OrderStatus::Matched,
            execution_status: ExecutionStatus::FullFill,
            expected_profit: dec!(5.00),
            actual_profit: None,
            status: TradeStatus::Pending,
            dry_run: false,
            pre_fill_yes_depth: None,
            pre_fill_no_depth: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_and_resolve_roundtrip() {
        let store = MemoryStore::new();
        let trade = sample_trade();
        store.save_trade(&trade).await.unwrap();
        store.resolve_trade(&trade.trade_id, true, dec!(5.00)).await.unwrap();

        let recent = store.get_recent_trades(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].status, TradeStatus::Win);
        assert_eq!(recent[0].actual_profit, Some(dec!(5.00)));
    }

    #[tokio::test]
    async fn circuit_breaker_trips_and_persists_across_reads() {
        let store = MemoryStore::new();
        let state = store.record_realized_pnl("t1", dec!(-15.00), PnlType::TradeSettlement, dec!(10.00)).await.unwrap();
        assert!(state.hit);
        let reread = store.get_circuit_breaker_state().await.unwrap();
        assert!(reread.hit);
    }
}
