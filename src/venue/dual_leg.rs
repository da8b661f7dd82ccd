use crate::models::market::{OrderBook, Side};
use crate::models::order::{OrderIntent, OrderResult, OrderSide, OrderStatus, TimeInForce};
use crate::venue::VenueAdapter;
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tracing::{error, warn};

/// Input to the dual-leg primitive. Prices/sizes come from the Opportunity
/// and Sizer, not refreshed from the book mid-flight (spec.md §4.6 step 3).
#[derive(Debug, Clone)]
pub struct DualLegRequest {
    pub yes_token_id: String,
    pub no_token_id: String,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub buffer: Decimal,
    pub max_consumption_fraction: Decimal,
    pub min_hedge_ratio: Decimal,
    pub critical_hedge_ratio: Decimal,
    pub t_submit_secs: u64,
    pub t_live_secs: u64,
}

#[derive(Debug, Clone)]
pub enum DualLegOutcome {
    /// Both legs matched or filled.
    Success {
        yes_fill: OrderResult,
        no_fill: OrderResult,
        yes_depth: Decimal,
        no_depth: Decimal,
    },
    /// Exactly one leg filled; the other was cancelled while LIVE.
    /// `filled_side` identifies which leg to hand to the Rebalancer.
    PartialFill {
        filled_side: Side,
        filled_result: OrderResult,
        unfilled_price: Decimal,
    },
    /// Neither leg executed, or preconditions failed before submission.
    Rejected { reason: String },
}

const MAX_BUFFERED_PRICE: Decimal = dec!(0.99);

/// Runs the preconditions and parallel two-leg submission described in
/// spec.md §4.6. Takes live books only to check depth preconditions —
/// execution prices are the caller-supplied opportunity prices plus buffer.
pub async fn execute_dual_leg(
    venue: &dyn VenueAdapter,
    req: &DualLegRequest,
    yes_book: &OrderBook,
    no_book: &OrderBook,
) -> Result<DualLegOutcome> {
    if req.yes_price + req.no_price >= Decimal::ONE {
        return Ok(DualLegOutcome::Rejected { reason: "arbitrage no longer exists".into() });
    }

    let (Some((_, _)), Some((_, _))) = (yes_book.best_ask(), no_book.best_ask()) else {
        return Ok(DualLegOutcome::Rejected { reason: "no liquidity".into() });
    };

    let yes_depth = yes_book.top_n_ask_depth(3);
    let no_depth = no_book.top_n_ask_depth(3);

    if req.yes_shares > yes_depth * req.max_consumption_fraction
        || req.no_shares > no_depth * req.max_consumption_fraction
    {
        return Ok(DualLegOutcome::Rejected { reason: "too much consumption".into() });
    }

    let yes_limit = (req.yes_price + req.buffer).min(MAX_BUFFERED_PRICE);
    let no_limit = (req.no_price + req.buffer).min(MAX_BUFFERED_PRICE);

    let yes_intent = OrderIntent {
        token_id: req.yes_token_id.clone(),
        market_side: Side::Yes,
        order_side: OrderSide::Buy,
        price: yes_limit,
        size: req.yes_shares,
        time_in_force: TimeInForce::GTC,
    };
    let no_intent = OrderIntent {
        token_id: req.no_token_id.clone(),
        market_side: Side::No,
        order_side: OrderSide::Buy,
        price: no_limit,
        size: req.no_shares,
        time_in_force: TimeInForce::GTC,
    };

    let submit = async {
        tokio::join!(venue.place_order(&yes_intent), venue.place_order(&no_intent))
    };

    let (yes_result, no_result) = match tokio::time::timeout(Duration::from_secs(req.t_submit_secs), submit).await {
        Ok((yes_res, no_res)) => (yes_res, no_res),
        Err(_) => {
            warn!("dual-leg submit timed out after {}s, cancelling", req.t_submit_secs);
            venue.cancel_all().await.ok();
            return Ok(DualLegOutcome::Rejected { reason: "submit timeout".into() });
        }
    };

    let mut yes_result = match yes_result {
        Ok(r) => r,
        Err(e) => {
            error!("yes leg submit failed: {e}");
            failed_result(&req.yes_token_id, req.yes_price, req.yes_shares)
        }
    };
    let mut no_result = match no_result {
        Ok(r) => r,
        Err(e) => {
            error!("no leg submit failed: {e}");
            failed_result(&req.no_token_id, req.no_price, req.no_shares)
        }
    };

    if yes_result.status.is_live() {
        tokio::time::sleep(Duration::from_secs(req.t_live_secs)).await;
        if let Ok(requeried) = venue.get_order(&yes_result.order_id).await {
            yes_result = requeried;
        }
    }
    if no_result.status.is_live() {
        tokio::time::sleep(Duration::from_secs(req.t_live_secs)).await;
        if let Ok(requeried) = venue.get_order(&no_result.order_id).await {
            no_result = requeried;
        }
    }

    let yes_filled = yes_result.status.is_filled();
    let no_filled = no_result.status.is_filled();

    if yes_filled && no_filled {
        enforce_hedge_ratio(&yes_result, &no_result, req.min_hedge_ratio, req.critical_hedge_ratio);
        return Ok(DualLegOutcome::Success { yes_fill: yes_result, no_fill: no_result, yes_depth, no_depth });
    }

    if yes_filled && !no_filled {
        if no_result.status.is_live() {
            venue.cancel(&no_result.order_id).await.ok();
        }
        return Ok(DualLegOutcome::PartialFill {
            filled_side: Side::Yes,
            filled_result: yes_result,
            unfilled_price: req.no_price,
        });
    }

    if no_filled && !yes_filled {
        if yes_result.status.is_live() {
            venue.cancel(&yes_result.order_id).await.ok();
        }
        return Ok(DualLegOutcome::PartialFill {
            filled_side: Side::No,
            filled_result: no_result,
            unfilled_price: req.yes_price,
        });
    }

    if yes_result.status.is_live() {
        venue.cancel(&yes_result.order_id).await.ok();
    }
    if no_result.status.is_live() {
        venue.cancel(&no_result.order_id).await.ok();
    }
    Ok(DualLegOutcome::Rejected { reason: "both legs failed".into() })
}

fn failed_result(token_id: &str, price: Decimal, size: Decimal) -> OrderResult {
    OrderResult {
        order_id: String::new(),
        token_id: token_id.to_string(),
        status: OrderStatus::Exception,
        filled_size: Decimal::ZERO,
        avg_fill_price: Decimal::ZERO,
        intended_size: size,
        intended_price: price,
        submitted_at: chrono::Utc::now(),
        error_msg: Some("submit error".into()),
    }
}

/// Logs hedge-ratio breaches per spec.md §4.6; does not mutate the trade
/// record itself — the caller (Executor) marks it `failed` on a sub-minimum
/// ratio using the same computation applied to the persisted TradeRecord.
fn enforce_hedge_ratio(yes: &OrderResult, no: &OrderResult, min_ratio: Decimal, critical_ratio: Decimal) {
    let (smaller, larger) = if yes.filled_size <= no.filled_size {
        (yes.filled_size, no.filled_size)
    } else {
        (no.filled_size, yes.filled_size)
    };
    if larger == Decimal::ZERO {
        return;
    }
    let ratio = smaller / larger;
    if ratio < critical_ratio {
        error!(critical = true, "hedge ratio {ratio} below critical floor {critical_ratio}");
    } else if ratio < min_ratio {
        error!("hedge ratio {ratio} below minimum {min_ratio}, trade will be marked failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::OrderResult;
    use chrono::Utc;

    fn result(status: OrderStatus, filled: Decimal) -> OrderResult {
        OrderResult {
            order_id: "o1".into(),
            token_id: "t".into(),
            status,
            filled_size: filled,
            avg_fill_price: dec!(0.40),
            intended_size: filled,
            intended_price: dec!(0.40),
            submitted_at: Utc::now(),
            error_msg: None,
        }
    }

    #[test]
    fn hedge_ratio_uses_smaller_over_larger() {
        let yes = result(OrderStatus::Filled, dec!(100));
        let no = result(OrderStatus::Filled, dec!(90));
        enforce_hedge_ratio(&yes, &no, dec!(0.8), dec!(0.5));
    }
}
