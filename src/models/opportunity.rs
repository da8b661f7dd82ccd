use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::Market;

/// A snapshot suggesting a dual-leg trade is worthwhile (spec.md §3).
///
/// Produced by the Book Tracker when spread meets threshold, enqueued in the
/// Opportunity Queue, and valid for a fixed window before it must be
/// discarded unexecuted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub market: Market,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub spread: Decimal,
    pub spread_cents: i64,
    pub profit_percentage: Decimal,
    pub detected_at: DateTime<Utc>,
}

/// An opportunity is logically expired 30 seconds after detection.
pub const OPPORTUNITY_VALIDITY_SECONDS: i64 = 30;

impl Opportunity {
    pub fn new(market: Market, yes_price: Decimal, no_price: Decimal) -> Self {
        let combined = yes_price + no_price;
        let spread = Decimal::ONE - combined;
        let spread_cents = (spread * Decimal::from(100))
            .round()
            .to_string()
            .parse::<i64>()
            .unwrap_or(0);
        let profit_percentage = if combined > Decimal::ZERO {
            spread / combined * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        Self {
            market,
            yes_price,
            no_price,
            spread,
            spread_cents,
            profit_percentage,
            detected_at: Utc::now(),
        }
    }

    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.detected_at).num_seconds()
    }

    pub fn is_expired(&self) -> bool {
        self.age_seconds() > OPPORTUNITY_VALIDITY_SECONDS
    }

    /// `yes_price + no_price < 1` at detection, per the invariant in spec.md §3.
    pub fn is_arbable(&self) -> bool {
        self.yes_price + self.no_price < Decimal::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Asset;

    fn test_market() -> Market {
        Market::new(
            "cond".into(),
            "btc-updown-15m-1".into(),
            Asset::BTC,
            "yes".into(),
            "no".into(),
            Utc::now(),
            Utc::now() + chrono::Duration::minutes(15),
        )
    }

    #[test]
    fn not_expired_immediately() {
        let opp = Opportunity::new(test_market(), "0.40".parse().unwrap(), "0.55".parse().unwrap());
        assert!(!opp.is_expired());
        assert!(opp.is_arbable());
    }

    #[test]
    fn exact_one_dollar_is_not_arbable() {
        let opp = Opportunity::new(test_market(), "0.50".parse().unwrap(), "0.50".parse().unwrap());
        assert!(!opp.is_arbable());
    }
}
