use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::Side;

/// Time-in-force the venue accepts (spec.md §4.1: only GTC and FOK).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC,
    FOK,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Venue order status (spec.md §4.1). `Simulated` is the engine-local status
/// used whenever a trading-mode other than LIVE diverts execution (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Matched,
    Filled,
    Live,
    Failed,
    Exception,
    Simulated,
}

impl OrderStatus {
    /// MATCHED or FILLED indicate executed shares; LIVE means resting,
    /// not yet filled, and retryable.
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Matched | OrderStatus::Filled)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Live)
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Exception)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub token_id: String,
    pub market_side: Side,
    pub order_side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub time_in_force: TimeInForce,
}

/// Result of a submit, carrying the local submit timestamp and the intended
/// (size, price) echo per spec.md §4.1's adapter contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub token_id: String,
    pub status: OrderStatus,
    pub filled_size: Decimal,
    pub avg_fill_price: Decimal,
    pub intended_size: Decimal,
    pub intended_price: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub error_msg: Option<String>,
}

impl OrderResult {
    pub fn fill_ratio(&self) -> Decimal {
        if self.intended_size == Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.filled_size / self.intended_size
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
    pub fee: Decimal,
}
