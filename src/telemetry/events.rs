//! Typed event stream the dashboard HTTP surface would subscribe to
//! (spec.md §6.4's "engine pushes updates via an event emitter" — the
//! HTTP surface itself is out of scope). Subscribers read, never write;
//! the Store stays the single source of durable truth.

use crate::models::order::OrderStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    TradeDecision {
        market_slug: String,
        approved: bool,
        reason: Option<String>,
        spread: Decimal,
        timestamp: DateTime<Utc>,
    },
    TradeExecuted {
        trade_id: String,
        market_slug: String,
        yes_status: OrderStatus,
        no_status: OrderStatus,
        expected_profit: Decimal,
        timestamp: DateTime<Utc>,
    },
    ModeTransition {
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },
    CircuitBreakerTrip {
        realized_pnl: Decimal,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    SettlementResult {
        trade_id: String,
        success: bool,
        proceeds: Option<Decimal>,
        timestamp: DateTime<Utc>,
    },
    PriceUpdate {
        market_slug: String,
        yes_ask: Decimal,
        no_ask: Decimal,
        spread_cents: i64,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Best-effort publish: with no subscribers the send simply drops.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::ModeTransition { from: "LIVE".into(), to: "BLACKOUT".into(), timestamp: Utc::now() });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::ModeTransition { .. }));
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(EngineEvent::CircuitBreakerTrip {
            realized_pnl: Decimal::ZERO,
            reason: "test".into(),
            timestamp: Utc::now(),
        });
    }
}
