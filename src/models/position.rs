use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::{Asset, Side};

/// A share holding awaiting market resolution and on-chain redemption
/// (spec.md §3). Created on every non-zero fill, including partial fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub trade_id: String,
    pub condition_id: String,
    pub token_id: String,
    pub side: Side,
    pub shares: Decimal,
    pub entry_price: Decimal,
    pub entry_cost: Decimal,
    pub market_end_time: DateTime<Utc>,
    pub asset: Asset,
    pub claimed: bool,
    pub proceeds: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub failed_attempts: u32,
}

impl Position {
    pub fn new(
        trade_id: String,
        condition_id: String,
        token_id: String,
        side: Side,
        shares: Decimal,
        entry_price: Decimal,
        market_end_time: DateTime<Utc>,
        asset: Asset,
    ) -> Self {
        Self {
            trade_id,
            condition_id,
            token_id,
            side,
            shares,
            entry_price,
            entry_cost: shares * entry_price,
            market_end_time,
            asset,
            claimed: false,
            proceeds: None,
            profit: None,
            failed_attempts: 0,
        }
    }

    /// Positions become settlement-eligible `wait_minutes` after market end.
    pub fn is_claimable(&self, now: DateTime<Utc>, wait_minutes: i64) -> bool {
        !self.claimed && now >= self.market_end_time + chrono::Duration::minutes(wait_minutes)
    }

    pub fn mark_claimed(&mut self, proceeds: Decimal) {
        self.profit = Some(proceeds - self.entry_cost);
        self.proceeds = Some(proceeds);
        self.claimed = true;
    }

    pub fn record_failed_attempt(&mut self) {
        self.failed_attempts += 1;
    }
}

/// Capital and exposure bookkeeping shared by the Risk Gate and Position
/// Manager. Not itself part of spec.md's durable data model, but the
/// in-memory aggregate the Store's daily-stats/realized-pnl rows feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub capital: Decimal,
    pub starting_capital: Decimal,
    pub daily_pnl: Decimal,
    pub total_pnl: Decimal,
    pub total_trades: u64,
    pub winning_trades: u64,
}

impl Portfolio {
    pub fn new(capital: Decimal) -> Self {
        Self {
            capital,
            starting_capital: capital,
            daily_pnl: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            total_trades: 0,
            winning_trades: 0,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }

    pub fn record_realized_pnl(&mut self, amount: Decimal, won: bool) {
        self.daily_pnl += amount;
        self.total_pnl += amount;
        self.total_trades += 1;
        if won {
            self.winning_trades += 1;
        }
    }

    pub fn reset_daily(&mut self) {
        self.daily_pnl = Decimal::ZERO;
    }
}
