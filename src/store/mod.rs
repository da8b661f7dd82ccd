pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::models::circuit_breaker::CircuitBreakerState;
use crate::models::daily::DailyCounters;
use crate::models::position::Position;
use crate::models::trade::TradeRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Aggregate statistics row as returned by `get_today_stats`/`get_all_time_stats`.
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub pending: u64,
    pub total_pnl: Decimal,
    pub total_volume: Decimal,
    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,
}

/// One entry in `get_pnl_history`: a day's realized PnL total.
#[derive(Debug, Clone)]
pub struct PnlHistoryEntry {
    pub date: NaiveDate,
    pub pnl: Decimal,
}

/// Kind of realized-PnL ledger entry, for `record_realized_pnl` (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnlType {
    TradeSettlement,
    RebalancerExit,
    Manual,
}

/// Durable, transactional facade over trades, positions, and daily/realized
/// PnL bookkeeping (spec.md §4.2). Every method is individually atomic; the
/// engine never assumes cross-method transactions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_trade(&self, trade: &TradeRecord) -> Result<()>;
    async fn resolve_trade(&self, trade_id: &str, won: bool, actual_profit: Decimal) -> Result<()>;

    async fn add_to_settlement_queue(&self, position: &Position) -> Result<()>;
    async fn mark_position_claimed(
        &self,
        trade_id: &str,
        token_id: &str,
        proceeds: Decimal,
        profit: Decimal,
    ) -> Result<()>;
    async fn record_claim_attempt(&self, trade_id: &str, token_id: &str, error: &str) -> Result<()>;
    async fn get_claimable_positions(&self, wait_minutes: i64) -> Result<Vec<Position>>;
    async fn get_unclaimed_positions(&self) -> Result<Vec<Position>>;

    async fn update_daily_stats(&self, date: Option<NaiveDate>, delta: &DailyCounters) -> Result<()>;

    /// Appends to the realized-PnL ledger and returns the recomputed
    /// `CircuitBreakerState`, tripping it if the new sum breaches
    /// `-max_daily_loss` (never auto-clearing — see
    /// `CircuitBreakerState::record_realized_pnl`).
    async fn record_realized_pnl(
        &self,
        trade_id: &str,
        amount: Decimal,
        pnl_type: PnlType,
        max_daily_loss: Decimal,
    ) -> Result<CircuitBreakerState>;
    async fn get_circuit_breaker_state(&self) -> Result<CircuitBreakerState>;
    async fn reset_circuit_breaker(&self) -> Result<()>;

    async fn get_today_stats(&self) -> Result<StatsSummary>;
    async fn get_all_time_stats(&self) -> Result<StatsSummary>;
    async fn get_recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>>;
    async fn get_pnl_history(&self, days: i64) -> Result<Vec<PnlHistoryEntry>>;

    /// Optional liquidity telemetry (spec.md §4.10 / SPEC_FULL.md §7).
    /// Default no-ops: a Store implementation that skips this surface still
    /// satisfies the trait.
    async fn save_fill_record(&self, _trade_id: &str, _token_id: &str, _slippage_bps: Decimal) -> Result<()> {
        Ok(())
    }
    async fn save_liquidity_snapshot(&self, _condition_id: &str, _yes_depth: Decimal, _no_depth: Decimal) -> Result<()> {
        Ok(())
    }
    async fn cleanup_old_liquidity_data(&self, _days: i64) -> Result<u64> {
        Ok(0)
    }
}
