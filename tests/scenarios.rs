//! End-to-end scenario coverage across the Risk Gate, Sizer, Trading Mode
//! selection and Rebalancer outcome boundary, composed the way the Executor
//! composes them. Per-module edge cases already live in each module's own
//! `#[cfg(test)]` block; this file exercises the seams between them.

use arbitrex::executor::TradingMode;
use arbitrex::models::circuit_breaker::CircuitBreakerState;
use arbitrex::models::market::{Asset, Market};
use arbitrex::models::opportunity::Opportunity;
use arbitrex::risk_gate::{RiskGate, RiskGateConfig, RiskGateContext};
use arbitrex::sizer::{Sizer, SizerConfig};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use std::time::Duration;

fn market(seconds_remaining: i64) -> Market {
    let now = Utc::now();
    Market::new(
        "cond-1".into(),
        "btc-updown-15m-1".into(),
        Asset::BTC,
        "yes-token".into(),
        "no-token".into(),
        now - ChronoDuration::minutes(14),
        now + ChronoDuration::seconds(seconds_remaining),
    )
}

fn risk_config() -> RiskGateConfig {
    RiskGateConfig {
        min_spread_threshold: dec!(0.02),
        max_daily_exposure: dec!(500),
        max_daily_loss: dec!(50),
        min_trade_size_usd: dec!(5),
    }
}

fn sizer_config() -> SizerConfig {
    SizerConfig {
        max_trade_size_usd: dec!(50),
        min_trade_size_usd: dec!(5),
        max_liquidity_consumption_pct: dec!(0.5),
        gradual_entry_tranches: 1,
        tranche_delay: Duration::from_secs(1),
    }
}

/// Happy path: a fresh, wide-enough spread with ample liquidity clears the
/// Risk Gate and sizes into a tradeable pair under LIVE mode.
#[test]
fn happy_path_opportunity_clears_gate_and_sizes() {
    let opportunity = Opportunity::new(market(600), dec!(0.40), dec!(0.55));
    let breaker = CircuitBreakerState::default();
    let ctx = RiskGateContext {
        config: &risk_config(),
        daily_exposure: dec!(0),
        circuit_breaker: &breaker,
        in_blackout: false,
        available_budget: dec!(200),
    };

    let decision = RiskGate::evaluate(&opportunity, &ctx);
    assert!(decision.approved, "reason: {:?}", decision.reason);

    let mode = TradingMode::select(false, breaker.hit, false);
    assert_eq!(mode, TradingMode::Live);

    let sized = Sizer::size(&sizer_config(), dec!(100), opportunity.yes_price, opportunity.no_price, dec!(1000), dec!(1000));
    assert!(sized.is_some());
}

/// A spread that doesn't clear the configured minimum is rejected before
/// ever reaching the Sizer, regardless of available budget.
#[test]
fn thin_spread_is_rejected_before_sizing() {
    let opportunity = Opportunity::new(market(600), dec!(0.49), dec!(0.50));
    let breaker = CircuitBreakerState::default();
    let ctx = RiskGateContext {
        config: &risk_config(),
        daily_exposure: dec!(0),
        circuit_breaker: &breaker,
        in_blackout: false,
        available_budget: dec!(200),
    };

    let decision = RiskGate::evaluate(&opportunity, &ctx);
    assert!(!decision.approved);
    assert!(decision.reason.unwrap().contains("spread"));
}

/// Once the circuit breaker has tripped, the Executor must route through
/// CIRCUIT_BREAKER mode and substitute a clean context into the Risk Gate
/// rather than reject on breaker state twice.
#[test]
fn tripped_breaker_selects_circuit_breaker_mode_and_gate_runs_clean() {
    let mut breaker = CircuitBreakerState::default();
    breaker.record_realized_pnl(dec!(-60), dec!(50));
    assert!(breaker.hit);

    let mode = TradingMode::select(false, breaker.hit, false);
    assert_eq!(mode, TradingMode::CircuitBreaker);
    assert!(mode.is_simulated());

    let opportunity = Opportunity::new(market(600), dec!(0.40), dec!(0.55));
    let clean_breaker = CircuitBreakerState::default();
    let ctx = RiskGateContext {
        config: &risk_config(),
        daily_exposure: dec!(0),
        circuit_breaker: &clean_breaker,
        in_blackout: false,
        available_budget: dec!(200),
    };
    let decision = RiskGate::evaluate(&opportunity, &ctx);
    assert!(decision.approved, "gate should judge on substantive terms once mode already captures the breaker trip");
}

/// A blackout flag takes priority over a tripped breaker and an explicit
/// dry-run flag, matching the engine's mode priority order.
#[test]
fn blackout_outranks_circuit_breaker_and_dry_run() {
    assert_eq!(TradingMode::select(true, true, true), TradingMode::Blackout);
    assert_eq!(TradingMode::select(true, false, false), TradingMode::Blackout);
}

/// An opportunity past its validity window never reaches the Sizer even
/// with everything else favorable.
#[test]
fn expired_opportunity_is_rejected() {
    let mut opportunity = Opportunity::new(market(600), dec!(0.40), dec!(0.55));
    opportunity.detected_at = Utc::now() - ChronoDuration::seconds(31);
    assert!(opportunity.is_expired());

    let breaker = CircuitBreakerState::default();
    let ctx = RiskGateContext {
        config: &risk_config(),
        daily_exposure: dec!(0),
        circuit_breaker: &breaker,
        in_blackout: false,
        available_budget: dec!(200),
    };
    let decision = RiskGate::evaluate(&opportunity, &ctx);
    assert!(!decision.approved);
    assert!(decision.reason.unwrap().contains("expired"));
}

/// A market with fewer than 60 seconds remaining is rejected even if the
/// spread and budget both look fine, since there is no time left to unwind
/// a partial fill safely.
#[test]
fn closing_market_is_rejected_regardless_of_spread() {
    let opportunity = Opportunity::new(market(30), dec!(0.40), dec!(0.55));
    let breaker = CircuitBreakerState::default();
    let ctx = RiskGateContext {
        config: &risk_config(),
        daily_exposure: dec!(0),
        circuit_breaker: &breaker,
        in_blackout: false,
        available_budget: dec!(200),
    };
    let decision = RiskGate::evaluate(&opportunity, &ctx);
    assert!(!decision.approved);
    assert!(decision.reason.unwrap().contains("remaining"));
}

/// Thin liquidity shrinks the sized trade below the minimum trade size and
/// the Sizer declines rather than submit a dust order.
#[test]
fn approved_but_illiquid_opportunity_is_declined_by_sizer() {
    let opportunity = Opportunity::new(market(600), dec!(0.40), dec!(0.55));
    let breaker = CircuitBreakerState::default();
    let ctx = RiskGateContext {
        config: &risk_config(),
        daily_exposure: dec!(0),
        circuit_breaker: &breaker,
        in_blackout: false,
        available_budget: dec!(200),
    };
    let decision = RiskGate::evaluate(&opportunity, &ctx);
    assert!(decision.approved);

    let sized = Sizer::size(&sizer_config(), dec!(100), opportunity.yes_price, opportunity.no_price, dec!(2), dec!(2));
    assert!(sized.is_none());
}
