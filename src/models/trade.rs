use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::market::Asset;
use super::order::OrderStatus;

/// Outcome classification of a dual-leg execution attempt (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    FullFill,
    PartialFill,
    OneLegOnly,
    Failed,
}

/// Settlement outcome of a trade once its market resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Win,
    Loss,
}

/// Durable record of an attempted or executed dual-leg trade (spec.md §3).
///
/// Every submitted real trade produces exactly one `TradeRecord`, whatever
/// its `execution_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub condition_id: String,
    pub asset: Asset,
    pub market_slug: String,
    pub market_end_time: DateTime<Utc>,

    pub intended_yes_price: Decimal,
    pub intended_no_price: Decimal,
    pub intended_yes_cost: Decimal,
    pub intended_no_cost: Decimal,

    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub yes_order_status: OrderStatus,
    pub no_order_status: OrderStatus,

    pub execution_status: ExecutionStatus,
    pub expected_profit: Decimal,
    pub actual_profit: Option<Decimal>,
    pub status: TradeStatus,
    pub dry_run: bool,

    pub pre_fill_yes_depth: Option<Decimal>,
    pub pre_fill_no_depth: Option<Decimal>,

    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// `min(yes, no) / max(yes, no)`; 0 when one leg is zero (spec.md glossary).
    pub fn hedge_ratio(&self) -> Decimal {
        let (yes, no) = (self.yes_shares, self.no_shares);
        if yes == Decimal::ZERO || no == Decimal::ZERO {
            return Decimal::ZERO;
        }
        yes.min(no) / yes.max(no)
    }
}
