//! Bounded opportunity queue (spec.md §4.5): the Book Tracker pushes,
//! the Executor pops. Full queue drops the newest item rather than
//! blocking the tracker; validity is re-checked at pop time so a
//! backlog self-cleans instead of executing stale spreads.

use crate::models::opportunity::Opportunity;
use tokio::sync::mpsc;
use tracing::warn;

pub const QUEUE_CAPACITY: usize = 256;

pub struct OpportunitySender {
    tx: mpsc::Sender<Opportunity>,
}

pub struct OpportunityReceiver {
    rx: mpsc::Receiver<Opportunity>,
}

pub fn channel() -> (OpportunitySender, OpportunityReceiver) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (OpportunitySender { tx }, OpportunityReceiver { rx })
}

impl OpportunitySender {
    /// Attempts to enqueue; if the queue is full, drops the new opportunity
    /// and logs a warning rather than applying backpressure to the tracker.
    pub fn push(&self, opportunity: Opportunity) {
        match self.tx.try_send(opportunity) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(opp)) => {
                warn!(
                    market = %opp.market.slug,
                    spread_cents = opp.spread_cents,
                    "opportunity queue full, dropping newest"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("opportunity queue closed, dropping opportunity");
            }
        }
    }
}

impl OpportunityReceiver {
    /// Pops the next opportunity that is still valid (not expired, still
    /// arbable at the price it was captured with). Stale entries are
    /// discarded silently; this drains the whole backlog down to either a
    /// fresh opportunity or an empty queue.
    pub async fn pop_valid(&mut self) -> Option<Opportunity> {
        loop {
            let opp = self.rx.recv().await?;
            if !opp.is_expired() && opp.is_arbable() {
                return Some(opp);
            }
        }
    }

    /// Non-blocking variant used by the executor's shutdown-aware loop.
    pub fn try_pop_valid(&mut self) -> Option<Opportunity> {
        loop {
            match self.rx.try_recv() {
                Ok(opp) if !opp.is_expired() && opp.is_arbable() => return Some(opp),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{Asset, Market};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn market() -> Market {
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

    #[tokio::test]
    async fn pop_valid_skips_stale_entries_at_pop_time() {
        let (tx, mut rx) = channel();
        let mut stale = Opportunity::new(market(), dec!(0.40), dec!(0.55));
        stale.detected_at = Utc::now() - chrono::Duration::seconds(31);
        tx.push(stale);
        tx.push(Opportunity::new(market(), dec!(0.40), dec!(0.55)));

        let popped = rx.pop_valid().await.unwrap();
        assert!(!popped.is_expired());
    }

    #[tokio::test]
    async fn full_queue_drops_newest_without_blocking() {
        let (tx, mut rx) = channel();
        for _ in 0..QUEUE_CAPACITY + 5 {
            tx.push(Opportunity::new(market(), dec!(0.40), dec!(0.55)));
        }
        let mut drained = 0;
        while rx.try_pop_valid().is_some() {
            drained += 1;
        }
        assert!(drained <= QUEUE_CAPACITY);
    }
}
