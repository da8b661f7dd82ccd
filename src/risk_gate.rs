//! Risk Gate (spec.md §4.8): a stateless pre-flight check run against
//! every opportunity before the Sizer and the venue ever see it.
//! Rejections carry a structured reason so the dashboard can render
//! exactly why a spread was passed on.

use crate::models::circuit_breaker::CircuitBreakerState;
use crate::models::opportunity::{Opportunity, OPPORTUNITY_VALIDITY_SECONDS};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct RiskDecision {
    pub market_slug: String,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub spread: Decimal,
    pub approved: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RiskGateConfig {
    pub min_spread_threshold: Decimal,
    pub max_daily_exposure: Decimal,
    pub max_daily_loss: Decimal,
    pub min_trade_size_usd: Decimal,
}

/// Per-call inputs the gate needs but doesn't own: today's running
/// exposure, the circuit breaker and blackout flags, and current balance.
pub struct RiskGateContext<'a> {
    pub config: &'a RiskGateConfig,
    pub daily_exposure: Decimal,
    pub circuit_breaker: &'a CircuitBreakerState,
    pub in_blackout: bool,
    pub available_budget: Decimal,
}

pub struct RiskGate;

impl RiskGate {
    /// Runs every check in spec order, stopping at (and reporting) the
    /// first failure. A trade whose approximate cost can't be computed
    /// (zero shares intended) is rejected defensively.
    pub fn evaluate(opportunity: &Opportunity, ctx: &RiskGateContext) -> RiskDecision {
        let reject = |reason: &str| RiskDecision {
            market_slug: opportunity.market.slug.clone(),
            yes_price: opportunity.yes_price,
            no_price: opportunity.no_price,
            spread: opportunity.spread,
            approved: false,
            reason: Some(reason.to_string()),
        };

        if opportunity.age_seconds() > OPPORTUNITY_VALIDITY_SECONDS {
            let decision = reject(&format!("opportunity expired ({}s old)", opportunity.age_seconds()));
            warn!(?decision, "risk gate rejected");
            return decision;
        }

        if opportunity.spread < ctx.config.min_spread_threshold {
            let decision = reject(&format!(
                "spread {} below min threshold {}",
                opportunity.spread, ctx.config.min_spread_threshold
            ));
            warn!(?decision, "risk gate rejected");
            return decision;
        }

        if opportunity.market.seconds_remaining() < 60.0 {
            let decision = reject("fewer than 60s remaining in market window");
            warn!(?decision, "risk gate rejected");
            return decision;
        }

        if opportunity.yes_price <= Decimal::ZERO
            || opportunity.no_price <= Decimal::ZERO
            || opportunity.yes_price + opportunity.no_price >= Decimal::ONE
        {
            let decision = reject("prices outside valid arbitrage range");
            warn!(?decision, "risk gate rejected");
            return decision;
        }

        let trade_cost = opportunity.yes_price + opportunity.no_price;
        if ctx.config.max_daily_exposure > Decimal::ZERO
            && ctx.daily_exposure + trade_cost > ctx.config.max_daily_exposure
        {
            let decision = reject(&format!(
                "daily exposure {} + trade {} exceeds max {}",
                ctx.daily_exposure, trade_cost, ctx.config.max_daily_exposure
            ));
            warn!(?decision, "risk gate rejected");
            return decision;
        }

        if ctx.circuit_breaker.hit {
            let decision = reject("circuit breaker tripped");
            warn!(?decision, "risk gate rejected");
            return decision;
        }

        if ctx.in_blackout {
            let decision = reject("blackout window active");
            warn!(?decision, "risk gate rejected");
            return decision;
        }

        let min_both_legs = ctx.config.min_trade_size_usd * Decimal::from(2);
        if ctx.available_budget < min_both_legs {
            let decision = reject(&format!(
                "available budget {} below minimum for both legs {}",
                ctx.available_budget, min_both_legs
            ));
            warn!(?decision, "risk gate rejected");
            return decision;
        }

        RiskDecision {
            market_slug: opportunity.market.slug.clone(),
            yes_price: opportunity.yes_price,
            no_price: opportunity.no_price,
            spread: opportunity.spread,
            approved: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{Asset, Market};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn market(secs_remaining: i64) -> Market {
        Market::new(
            "cond".into(),
            "btc-updown-15m-1".into(),
            Asset::BTC,
            "yes".into(),
            "no".into(),
            Utc::now(),
            Utc::now() + chrono::Duration::seconds(secs_remaining),
        )
    }

    fn base_config() -> RiskGateConfig {
        RiskGateConfig {
            min_spread_threshold: dec!(0.02),
            max_daily_exposure: dec!(1000),
            max_daily_loss: dec!(50),
            min_trade_size_usd: dec!(5),
        }
    }

    #[test]
    fn approves_a_healthy_opportunity() {
        let opp = Opportunity::new(market(900), dec!(0.40), dec!(0.55));
        let breaker = CircuitBreakerState::default();
        let config = base_config();
        let ctx = RiskGateContext {
            config: &config,
            daily_exposure: dec!(0),
            circuit_breaker: &breaker,
            in_blackout: false,
            available_budget: dec!(100),
        };
        let decision = RiskGate::evaluate(&opp, &ctx);
        assert!(decision.approved);
    }

    #[test]
    fn rejects_when_seconds_remaining_under_sixty() {
        let opp = Opportunity::new(market(45), dec!(0.40), dec!(0.55));
        let breaker = CircuitBreakerState::default();
        let config = base_config();
        let ctx = RiskGateContext {
            config: &config,
            daily_exposure: dec!(0),
            circuit_breaker: &breaker,
            in_blackout: false,
            available_budget: dec!(100),
        };
        let decision = RiskGate::evaluate(&opp, &ctx);
        assert!(!decision.approved);
        assert!(decision.reason.unwrap().contains("60s"));
    }

    #[test]
    fn rejects_when_circuit_breaker_tripped() {
        let opp = Opportunity::new(market(900), dec!(0.40), dec!(0.55));
        let mut breaker = CircuitBreakerState::default();
        breaker.record_realized_pnl(dec!(-60), dec!(50));
        let config = base_config();
        let ctx = RiskGateContext {
            config: &config,
            daily_exposure: dec!(0),
            circuit_breaker: &breaker,
            in_blackout: false,
            available_budget: dec!(100),
        };
        let decision = RiskGate::evaluate(&opp, &ctx);
        assert!(!decision.approved);
        assert_eq!(decision.reason.unwrap(), "circuit breaker tripped");
    }

    #[test]
    fn rejects_insufficient_budget_for_both_legs() {
        let opp = Opportunity::new(market(900), dec!(0.40), dec!(0.55));
        let breaker = CircuitBreakerState::default();
        let config = base_config();
        let ctx = RiskGateContext {
            config: &config,
            daily_exposure: dec!(0),
            circuit_breaker: &breaker,
            in_blackout: false,
            available_budget: dec!(8),
        };
        let decision = RiskGate::evaluate(&opp, &ctx);
        assert!(!decision.approved);
    }
}
