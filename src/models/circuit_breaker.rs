use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Process-wide circuit breaker state (spec.md §3).
///
/// `hit` is monotonic: once a realized-PnL write drives `realized_pnl ≤
/// -max_daily_loss`, it stays true until an explicit operator reset, never
/// resetting itself on a new day or a subsequent profitable trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub realized_pnl: Decimal,
    pub hit: bool,
    pub hit_at: Option<DateTime<Utc>>,
    pub hit_reason: Option<String>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            realized_pnl: Decimal::ZERO,
            hit: false,
            hit_at: None,
            hit_reason: None,
        }
    }
}

impl CircuitBreakerState {
    /// Appends `amount` to the running realized-PnL sum and flips `hit` if
    /// the new sum breaches `-max_daily_loss`. Idempotent once already hit:
    /// the sum keeps moving but `hit`/`hit_at`/`hit_reason` never change.
    pub fn record_realized_pnl(&mut self, amount: Decimal, max_daily_loss: Decimal) {
        self.realized_pnl += amount;
        if !self.hit && self.realized_pnl <= -max_daily_loss {
            self.hit = true;
            self.hit_at = Some(Utc::now());
            self.hit_reason = Some(format!(
                "realized_pnl {} <= -max_daily_loss {}",
                self.realized_pnl, max_daily_loss
            ));
        }
    }

    /// Operator-initiated reset. Does not clear `realized_pnl`: the ledger
    /// sum remains the source of truth (spec.md §8 invariant 3).
    pub fn reset(&mut self) {
        self.hit = false;
        self.hit_at = None;
        self.hit_reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trips_at_exact_threshold() {
        let mut state = CircuitBreakerState::default();
        state.record_realized_pnl(dec!(-9.80), dec!(10.00));
        assert!(!state.hit);
        state.record_realized_pnl(dec!(-0.50), dec!(10.00));
        assert!(state.hit);
        assert_eq!(state.realized_pnl, dec!(-10.30));
    }

    #[test]
    fn stays_tripped_after_a_profitable_trade() {
        let mut state = CircuitBreakerState::default();
        state.record_realized_pnl(dec!(-10.00), dec!(10.00));
        assert!(state.hit);
        state.record_realized_pnl(dec!(5.00), dec!(10.00));
        assert!(state.hit, "a later profit must not clear the trip");
    }

    #[test]
    fn reset_clears_hit_but_not_the_ledger() {
        let mut state = CircuitBreakerState::default();
        state.record_realized_pnl(dec!(-15.00), dec!(10.00));
        state.reset();
        assert!(!state.hit);
        assert_eq!(state.realized_pnl, dec!(-15.00));
    }
}
