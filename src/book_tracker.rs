//! Live order book tracker (spec.md §4.4): maintains one [`MarketState`]
//! per condition id from a WebSocket feed, and synthesizes an
//! [`Opportunity`] onto the queue whenever a mutation crosses the
//! configured spread threshold.

use crate::models::market::{Market, MarketState, Side};
use crate::models::opportunity::Opportunity;
use crate::opportunity_queue::OpportunitySender;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const STATE_CHANGE_THROTTLE: Duration = Duration::from_millis(500);

pub trait StateChangeObserver: Send + Sync {
    fn on_state_change(&self, state: &MarketState);
}

pub struct BookTracker {
    ws_host: String,
    min_spread_cents: i64,
    states: DashMap<String, MarketState>,
    token_to_condition: DashMap<String, String>,
    token_to_side: DashMap<String, Side>,
    /// Memoized venue-id -> tracked-id resolutions for prefix-tolerant matching.
    resolved_ids: DashMap<String, String>,
    last_notified: DashMap<String, Mutex<Instant>>,
    opportunities: OpportunitySender,
    observer: Option<Box<dyn StateChangeObserver>>,
}

#[derive(Debug, Deserialize)]
struct WsBookUpdate {
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    bids: Vec<WsLevel>,
    #[serde(default)]
    asks: Vec<WsLevel>,
    #[serde(default)]
    changes: Vec<WsPriceChange>,
}

#[derive(Debug, Deserialize)]
struct WsLevel {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct WsPriceChange {
    asset_id: String,
    price: String,
    size: String,
    side: String,
}

impl BookTracker {
    pub fn new(ws_host: String, min_spread_cents: i64, opportunities: OpportunitySender) -> Self {
        Self {
            ws_host,
            min_spread_cents,
            states: DashMap::new(),
            token_to_condition: DashMap::new(),
            token_to_side: DashMap::new(),
            resolved_ids: DashMap::new(),
            last_notified: DashMap::new(),
            opportunities,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn StateChangeObserver>) {
        self.observer = Some(observer);
    }

    /// Adds a market to the tracked set, wiring both reverse indexes. Safe
    /// to call repeatedly for the same condition id (idempotent).
    pub fn register_market(&self, market: Market) {
        let condition_id = market.condition_id.clone();
        self.token_to_condition.insert(market.yes_token_id.clone(), condition_id.clone());
        self.token_to_condition.insert(market.no_token_id.clone(), condition_id.clone());
        self.token_to_side.insert(market.yes_token_id.clone(), Side::Yes);
        self.token_to_side.insert(market.no_token_id.clone(), Side::No);
        self.states.entry(condition_id).or_insert_with(|| MarketState::new(market));
    }

    pub fn tracked_token_ids(&self) -> Vec<String> {
        self.token_to_condition.iter().map(|e| e.key().clone()).collect()
    }

    pub fn state_for(&self, condition_id: &str) -> Option<MarketState> {
        self.states.get(condition_id).map(|r| r.clone())
    }

    /// Runs the reconnect loop until `shutdown` fires. Backs off 1s up to a
    /// 60s cap between attempts and resubscribes every previously tracked
    /// token id in a single batched message on reconnect.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = MIN_BACKOFF;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("book tracker shutting down");
                    return;
                }
                result = self.connect_and_stream(&mut shutdown) => {
                    match result {
                        Ok(()) => {
                            info!("book tracker stream closed cleanly, reconnecting");
                            backoff = MIN_BACKOFF;
                        }
                        Err(e) => {
                            warn!("book tracker stream error: {e}, retrying in {:?}", backoff);
                        }
                    }
                }
            }
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect_and_stream(&self, shutdown: &mut broadcast::Receiver<()>) -> anyhow::Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.ws_host).await?;
        let (mut write, mut read) = ws_stream.split();

        let token_ids = self.tracked_token_ids();
        if !token_ids.is_empty() {
            let subscribe = serde_json::json!({
                "auth": {},
                "type": "subscribe",
                "channel": "market",
                "assets_ids": token_ids,
            });
            write.send(Message::Text(subscribe.to_string())).await?;
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_message(&text);
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            anyhow::bail!("websocket error: {e}");
                        }
                    }
                }
            }
        }
    }

    fn handle_message(&self, text: &str) {
        let updates: Vec<WsBookUpdate> = match serde_json::from_str::<Vec<WsBookUpdate>>(text) {
            Ok(u) => u,
            Err(_) => match serde_json::from_str::<WsBookUpdate>(text) {
                Ok(single) => vec![single],
                Err(e) => {
                    debug!("unparseable ws message, ignoring: {e}");
                    return;
                }
            },
        };

        for update in updates {
            match update.event_type.as_deref() {
                Some("price_change") => self.apply_price_change(&update),
                _ => self.apply_snapshot(&update),
            }
        }
    }

    /// Full book replacement, used for the `book` event kind.
    fn apply_snapshot(&self, update: &WsBookUpdate) {
        let Some(raw_asset_id) = update.asset_id.as_deref().or(update.market.as_deref()) else {
            return;
        };
        let Some(tracked_id) = self.resolve_token_id(raw_asset_id) else {
            return;
        };
        let Some(condition_id) = self.token_to_condition.get(&tracked_id).map(|r| r.clone()) else {
            return;
        };
        let Some(side) = self.token_to_side.get(&tracked_id).map(|r| *r) else {
            return;
        };

        let mut bids = std::collections::BTreeMap::new();
        for level in &update.bids {
            if let (Ok(p), Ok(s)) = (Decimal::from_str(&level.price), Decimal::from_str(&level.size)) {
                bids.insert(p, s);
            }
        }
        let mut asks = std::collections::BTreeMap::new();
        for level in &update.asks {
            if let (Ok(p), Ok(s)) = (Decimal::from_str(&level.price), Decimal::from_str(&level.size)) {
                asks.insert(p, s);
            }
        }

        if let Some(mut entry) = self.states.get_mut(&condition_id) {
            let book = match side {
                Side::Yes => &mut entry.yes_book,
                Side::No => &mut entry.no_book,
            };
            book.bids = bids;
            book.asks = asks;
            book.timestamp = chrono::Utc::now();
            entry.last_update = chrono::Utc::now();
            drop(entry);
            self.after_mutation(&condition_id);
        }
    }

    /// Incremental top-of-book delta, used for the `price_change` event
    /// kind: updates or removes a single price level per change entry.
    fn apply_price_change(&self, update: &WsBookUpdate) {
        let mut touched: Option<String> = None;
        for change in &update.changes {
            let Some(tracked_id) = self.resolve_token_id(&change.asset_id) else { continue };
            let Some(condition_id) = self.token_to_condition.get(&tracked_id).map(|r| r.clone()) else { continue };
            let Some(side) = self.token_to_side.get(&tracked_id).map(|r| *r) else { continue };
            let (Ok(price), Ok(size)) = (Decimal::from_str(&change.price), Decimal::from_str(&change.size)) else { continue };

            if let Some(mut entry) = self.states.get_mut(&condition_id) {
                let book = match side {
                    Side::Yes => &mut entry.yes_book,
                    Side::No => &mut entry.no_book,
                };
                let book_side = if change.side.eq_ignore_ascii_case("buy") { &mut book.bids } else { &mut book.asks };
                if size.is_zero() {
                    book_side.remove(&price);
                } else {
                    book_side.insert(price, size);
                }
                book.timestamp = chrono::Utc::now();
                entry.last_update = chrono::Utc::now();
            }
            touched = Some(condition_id);
        }
        if let Some(condition_id) = touched {
            self.after_mutation(&condition_id);
        }
    }

    /// Resolves a venue-supplied asset id to the exact tracked token id,
    /// tolerating a differing string prefix/suffix the venue sometimes adds.
    /// Successful fuzzy resolutions are memoized so subsequent lookups are
    /// exact-match fast.
    fn resolve_token_id(&self, raw_id: &str) -> Option<String> {
        if self.token_to_condition.contains_key(raw_id) {
            return Some(raw_id.to_string());
        }
        if let Some(cached) = self.resolved_ids.get(raw_id) {
            return Some(cached.clone());
        }
        let found = self
            .token_to_condition
            .iter()
            .map(|e| e.key().clone())
            .find(|tracked| tracked.starts_with(raw_id) || raw_id.starts_with(tracked.as_str()));
        if let Some(ref tracked) = found {
            self.resolved_ids.insert(raw_id.to_string(), tracked.clone());
        }
        found
    }

    /// Rate-limited (2/sec/market) state-change notification plus spread
    /// recomputation that synthesizes an opportunity when the threshold is met.
    fn after_mutation(&self, condition_id: &str) {
        let Some(state) = self.states.get(condition_id).map(|r| r.clone()) else { return };

        let should_notify = {
            let slot = self.last_notified.entry(condition_id.to_string()).or_insert_with(|| Mutex::new(Instant::now() - STATE_CHANGE_THROTTLE));
            let mut last = slot.lock().unwrap();
            if last.elapsed() >= STATE_CHANGE_THROTTLE {
                *last = Instant::now();
                true
            } else {
                false
            }
        };

        if should_notify {
            if let Some(observer) = &self.observer {
                observer.on_state_change(&state);
            }
        }

        if !state.market.is_tradeable() || state.is_stale() {
            return;
        }

        let spread_cents = (state.spread() * Decimal::from(100)).round().to_string().parse::<i64>().unwrap_or(0);
        if spread_cents >= self.min_spread_cents {
            let opportunity = Opportunity::new(state.market.clone(), state.yes_ask(), state.no_ask());
            if opportunity.is_arbable() {
                self.opportunities.push(opportunity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Asset;
    use crate::opportunity_queue::channel;
    use chrono::Utc;

    fn sample_market() -> Market {
        Market::new(
            "cond-1".into(),
            "btc-updown-15m-1".into(),
            Asset::BTC,
            "yes-token".into(),
            "no-token".into(),
            Utc::now(),
            Utc::now() + chrono::Duration::minutes(15),
        )
    }

    #[test]
    fn prefix_tolerant_resolution_memoizes() {
        let (tx, _rx) = channel();
        let tracker = BookTracker::new("wss://example".into(), 1, tx);
        tracker.register_market(sample_market());

        let resolved = tracker.resolve_token_id("yes-token-0001").unwrap();
        assert_eq!(resolved, "yes-token");
        assert!(tracker.resolved_ids.contains_key("yes-token-0001"));
    }

    #[tokio::test]
    async fn snapshot_update_emits_opportunity_above_threshold() {
        let (tx, mut rx) = channel();
        let tracker = BookTracker::new("wss://example".into(), 1, tx);
        tracker.register_market(sample_market());

        let yes_update = WsBookUpdate {
            event_type: Some("book".into()),
            asset_id: Some("yes-token".into()),
            market: None,
            bids: vec![],
            asks: vec![WsLevel { price: "0.40".into(), size: "100".into() }],
            changes: vec![],
        };
        let no_update = WsBookUpdate {
            event_type: Some("book".into()),
            asset_id: Some("no-token".into()),
            market: None,
            bids: vec![],
            asks: vec![WsLevel { price: "0.55".into(), size: "100".into() }],
            changes: vec![],
        };
        tracker.apply_snapshot(&yes_update);
        tracker.apply_snapshot(&no_update);

        let opp = rx.pop_valid().await.unwrap();
        assert_eq!(opp.spread_cents, 5);
    }
}
