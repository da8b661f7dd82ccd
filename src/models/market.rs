use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Underlying asset a 15-minute up/down market tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    BTC,
    ETH,
}

impl Asset {
    pub fn slug_prefix(&self) -> &'static str {
        match self {
            Asset::BTC => "btc",
            Asset::ETH => "eth",
        }
    }

    pub fn from_slug_prefix(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "btc" => Some(Asset::BTC),
            "eth" => Some(Asset::ETH),
            _ => None,
        }
    }
}

/// Outcome side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

/// Every market on this venue is a fixed 15-minute window.
pub const MARKET_WINDOW_SECONDS: u64 = 900;

/// A single 15-minute binary up/down market: the unit the engine trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub slug: String,
    pub asset: Asset,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active: bool,
}

impl Market {
    pub fn new(
        condition_id: String,
        slug: String,
        asset: Asset,
        yes_token_id: String,
        no_token_id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            condition_id,
            slug,
            asset,
            yes_token_id,
            no_token_id,
            start_time,
            end_time,
            active: true,
        }
    }

    pub fn seconds_remaining(&self) -> f64 {
        let now = Utc::now();
        if now >= self.end_time {
            return 0.0;
        }
        (self.end_time - now).num_milliseconds() as f64 / 1000.0
    }

    /// Strict `> 60`, per the fixed boundary (spec.md resolves the source's
    /// inconsistent `>=`/`>` usage at `> 60`).
    pub fn is_tradeable(&self) -> bool {
        self.active && self.seconds_remaining() > 60.0
    }

    pub fn generate_slug(asset: Asset, interval_start_unix: u64) -> String {
        format!("{}-updown-15m-{}", asset.slug_prefix(), interval_start_unix)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// One side's live order book (bids ascending, asks ascending by key order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub token_id: String,
    pub bids: BTreeMap<Decimal, Decimal>,
    pub asks: BTreeMap<Decimal, Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(&p, &s)| (p, s))
    }

    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(&p, &s)| (p, s))
    }

    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Available ask depth within `tolerance` of the best ask price.
    pub fn ask_depth_within(&self, tolerance: Decimal) -> Decimal {
        let Some((best, _)) = self.best_ask() else {
            return Decimal::ZERO;
        };
        let max_price = best + tolerance;
        self.asks.range(..=max_price).map(|(_, &size)| size).sum()
    }

    /// Available bid depth within `tolerance` of the best bid price.
    pub fn bid_depth_within(&self, tolerance: Decimal) -> Decimal {
        let Some((best, _)) = self.best_bid() else {
            return Decimal::ZERO;
        };
        let min_price = best - tolerance;
        self.bids.range(min_price..).map(|(_, &size)| size).sum()
    }

    /// Sum of size across the top `n` ask levels (spec.md §4.6's "top-3 ask depth").
    pub fn top_n_ask_depth(&self, n: usize) -> Decimal {
        self.asks.iter().take(n).map(|(_, &size)| size).sum()
    }
}

/// Live view of one market's two books (spec.md §3 MarketState).
///
/// Mutated only by the Book Tracker from WS events. An unknown side uses a
/// sentinel ask of 1.00 and bid of 0.00 so the derived spread is
/// conservatively unprofitable rather than erroring out.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub market: Market,
    pub yes_book: OrderBook,
    pub no_book: OrderBook,
    pub last_update: DateTime<Utc>,
}

impl MarketState {
    pub fn new(market: Market) -> Self {
        let yes_book = OrderBook::new(market.yes_token_id.clone());
        let no_book = OrderBook::new(market.no_token_id.clone());
        Self {
            market,
            yes_book,
            no_book,
            last_update: Utc::now(),
        }
    }

    fn sentinel_ask() -> Decimal {
        Decimal::ONE
    }

    pub fn yes_ask(&self) -> Decimal {
        self.yes_book.best_ask().map(|(p, _)| p).unwrap_or_else(Self::sentinel_ask)
    }

    pub fn no_ask(&self) -> Decimal {
        self.no_book.best_ask().map(|(p, _)| p).unwrap_or_else(Self::sentinel_ask)
    }

    pub fn yes_bid(&self) -> Decimal {
        self.yes_book.best_bid().map(|(p, _)| p).unwrap_or(Decimal::ZERO)
    }

    pub fn no_bid(&self) -> Decimal {
        self.no_book.best_bid().map(|(p, _)| p).unwrap_or(Decimal::ZERO)
    }

    pub fn combined_cost(&self) -> Decimal {
        self.yes_ask() + self.no_ask()
    }

    pub fn spread(&self) -> Decimal {
        Decimal::ONE - self.combined_cost()
    }

    pub fn is_stale(&self) -> bool {
        (Utc::now() - self.last_update).num_seconds() >= 10
    }

    pub fn book_for(&self, side: Side) -> &OrderBook {
        match side {
            Side::Yes => &self.yes_book,
            Side::No => &self.no_book,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_with_ask(token: &str, price: &str, size: &str) -> OrderBook {
        let mut b = OrderBook::new(token.to_string());
        b.asks.insert(price.parse().unwrap(), size.parse().unwrap());
        b
    }

    #[test]
    fn unknown_side_is_conservatively_unprofitable() {
        let market = Market::new(
            "cond".into(),
            "btc-updown-15m-1".into(),
            Asset::BTC,
            "yes".into(),
            "no".into(),
            Utc::now(),
            Utc::now() + chrono::Duration::minutes(15),
        );
        let state = MarketState::new(market);
        assert_eq!(state.combined_cost(), Decimal::from(2));
        assert!(state.spread() < Decimal::ZERO);
    }

    #[test]
    fn spread_reflects_both_asks() {
        let market = Market::new(
            "cond".into(),
            "btc-updown-15m-1".into(),
            Asset::BTC,
            "yes".into(),
            "no".into(),
            Utc::now(),
            Utc::now() + chrono::Duration::minutes(15),
        );
        let mut state = MarketState::new(market);
        state.yes_book = book_with_ask("yes", "0.40", "100");
        state.no_book = book_with_ask("no", "0.55", "100");
        assert_eq!(state.combined_cost(), "0.95".parse().unwrap());
        assert_eq!(state.spread(), "0.05".parse().unwrap());
    }

    #[test]
    fn seconds_remaining_boundary_is_strict_greater_than_sixty() {
        let market = Market::new(
            "cond".into(),
            "btc-updown-15m-1".into(),
            Asset::BTC,
            "yes".into(),
            "no".into(),
            Utc::now() - chrono::Duration::minutes(14),
            Utc::now() + chrono::Duration::seconds(60),
        );
        assert!(!market.is_tradeable());
    }
}
