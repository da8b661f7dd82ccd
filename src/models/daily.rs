use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-calendar-day (UTC) aggregates (spec.md §3). Reset lazily by comparing
/// wall-clock date to `date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCounters {
    pub date: NaiveDate,
    pub pnl: Decimal,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub exposure: Decimal,
    pub opportunities_detected: u64,
    pub opportunities_executed: u64,
    pub opportunities_skipped: u64,
}

impl DailyCounters {
    pub fn new_for_today() -> Self {
        Self {
            date: Utc::now().date_naive(),
            pnl: Decimal::ZERO,
            trades: 0,
            wins: 0,
            losses: 0,
            exposure: Decimal::ZERO,
            opportunities_detected: 0,
            opportunities_executed: 0,
            opportunities_skipped: 0,
        }
    }

    /// Rolls over to a fresh day if wall-clock date has advanced.
    pub fn roll_if_stale(&mut self) -> bool {
        let today = Utc::now().date_naive();
        if today != self.date {
            *self = Self {
                date: today,
                ..Self::new_for_today()
            };
            return true;
        }
        false
    }

    pub fn record_trade(&mut self, pnl_delta: Decimal, won: bool, exposure_delta: Decimal) {
        self.pnl += pnl_delta;
        self.trades += 1;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.exposure += exposure_delta;
    }
}
