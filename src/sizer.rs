//! Sizer (spec.md §4.9): turns a budget and an opportunity's prices into
//! concrete share counts, shrinking for liquidity and splitting into
//! tranches when gradual entry is configured.

use rust_decimal::Decimal;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SizerConfig {
    pub max_trade_size_usd: Decimal,
    pub min_trade_size_usd: Decimal,
    pub max_liquidity_consumption_pct: Decimal,
    pub gradual_entry_tranches: u32,
    pub tranche_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct SizedTrade {
    pub pairs: Decimal,
    pub yes_usd: Decimal,
    pub no_usd: Decimal,
    pub tranches: Vec<Decimal>,
}

pub struct Sizer;

impl Sizer {
    /// Computes an equal-shares allocation, scales for `max_trade_size_usd`,
    /// shrinks for book depth, and rejects if the shrunk size falls below
    /// `min_trade_size_usd`. Returns `None` on rejection ("insufficient
    /// liquidity" — the caller logs the reason with opportunity context).
    pub fn size(
        config: &SizerConfig,
        budget: Decimal,
        yes_price: Decimal,
        no_price: Decimal,
        yes_depth: Decimal,
        no_depth: Decimal,
    ) -> Option<SizedTrade> {
        let combined = yes_price + no_price;
        if combined <= Decimal::ZERO || budget <= Decimal::ZERO {
            return None;
        }

        let mut pairs = budget / combined;
        let mut yes_usd = pairs * yes_price;
        let mut no_usd = pairs * no_price;

        let max_leg = yes_usd.max(no_usd);
        if max_leg > config.max_trade_size_usd {
            let scale = config.max_trade_size_usd / max_leg;
            pairs *= scale;
            yes_usd *= scale;
            no_usd *= scale;
        }

        let max_consumable_yes = yes_depth * config.max_liquidity_consumption_pct;
        let max_consumable_no = no_depth * config.max_liquidity_consumption_pct;
        let yes_shares_cap = if yes_price > Decimal::ZERO { max_consumable_yes } else { pairs };
        let no_shares_cap = if no_price > Decimal::ZERO { max_consumable_no } else { pairs };
        let liquidity_cap_pairs = yes_shares_cap.min(no_shares_cap);

        if liquidity_cap_pairs < pairs {
            pairs = liquidity_cap_pairs;
            yes_usd = pairs * yes_price;
            no_usd = pairs * no_price;
        }

        if pairs <= Decimal::ZERO || yes_usd < config.min_trade_size_usd || no_usd < config.min_trade_size_usd {
            info!(
                pairs = %pairs, yes_usd = %yes_usd, no_usd = %no_usd,
                "sizer rejected: insufficient liquidity after shrinking"
            );
            return None;
        }

        let tranches = Self::split_into_tranches(config, pairs);

        Some(SizedTrade { pairs, yes_usd, no_usd, tranches })
    }

    /// Splits `pairs` into `gradual_entry_tranches` equal pieces. Falls back
    /// to a single tranche if any piece would drop below the minimum trade
    /// size implied by the per-pair cost, or if gradual entry is disabled
    /// (tranches == 0 or 1).
    fn split_into_tranches(config: &SizerConfig, pairs: Decimal) -> Vec<Decimal> {
        if config.gradual_entry_tranches <= 1 {
            return vec![pairs];
        }
        let n = Decimal::from(config.gradual_entry_tranches);
        let per_tranche = pairs / n;
        if per_tranche <= Decimal::ZERO {
            return vec![pairs];
        }

        let mut tranches = vec![per_tranche; config.gradual_entry_tranches as usize - 1];
        let allocated: Decimal = tranches.iter().sum();
        tranches.push(pairs - allocated);
        tranches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> SizerConfig {
        SizerConfig {
            max_trade_size_usd: dec!(50),
            min_trade_size_usd: dec!(5),
            max_liquidity_consumption_pct: dec!(0.5),
            gradual_entry_tranches: 1,
            tranche_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn equal_shares_allocation_scales_by_price() {
        let sized = Sizer::size(&config(), dec!(100), dec!(0.40), dec!(0.55), dec!(1000), dec!(1000)).unwrap();
        assert_eq!(sized.yes_usd, sized.pairs * dec!(0.40));
        assert_eq!(sized.no_usd, sized.pairs * dec!(0.55));
    }

    #[test]
    fn caps_at_max_trade_size() {
        let sized = Sizer::size(&config(), dec!(1000), dec!(0.40), dec!(0.55), dec!(10000), dec!(10000)).unwrap();
        assert!(sized.yes_usd <= dec!(50) + dec!(0.0001));
        assert!(sized.no_usd <= dec!(50) + dec!(0.0001));
    }

    #[test]
    fn shrinks_for_thin_liquidity_and_rejects_below_minimum() {
        let sized = Sizer::size(&config(), dec!(100), dec!(0.40), dec!(0.55), dec!(1), dec!(1));
        assert!(sized.is_none());
    }

    #[test]
    fn gradual_entry_splits_into_equal_tranches() {
        let mut cfg = config();
        cfg.gradual_entry_tranches = 4;
        let sized = Sizer::size(&cfg, dec!(100), dec!(0.40), dec!(0.55), dec!(1000), dec!(1000)).unwrap();
        assert_eq!(sized.tranches.len(), 4);
        let total: Decimal = sized.tranches.iter().sum();
        assert_eq!(total, sized.pairs);
    }
}
