use chrono::{DateTime, FixedOffset, Timelike};
use crate::config::StrategyConfig;
use crate::data::types::PriceQuote;
use crate::strategies::types::{Action, Observation};

/// Turns two venue quotes into a logged observation.
#[derive(Debug, Clone)]
pub struct ObservationBuilder {
    config: StrategyConfig,
}

impl ObservationBuilder {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Rounds first, then decides, so the stored row always satisfies
    /// `NO_OPPORTUNITY <=> spread <= threshold` on its own values.
    pub fn build(
        &self,
        quote_a: &PriceQuote,
        quote_b: &PriceQuote,
        now: DateTime<FixedOffset>,
    ) -> Observation {
        let venue_a_price = round_to(quote_a.price, 4);
        let venue_b_price = round_to(quote_b.price, 4);
        let spread = round_to((venue_a_price - venue_b_price).abs(), 4);

        let action = decide_action(venue_a_price, venue_b_price, spread, self.config.spread_threshold);
        let estimated_profit = round_to(
            estimate_profit(spread, self.config.fee_rate, self.config.unit_size),
            2,
        );

        Observation {
            captured_at: now.with_nanosecond(0).unwrap_or(now),
            venue_a_price,
            venue_b_price,
            spread,
            action,
            estimated_profit,
            venue_a_volume: to_volume(quote_a.volume),
            venue_b_volume: to_volume(quote_b.volume),
            venue_a_simulated: quote_a.is_simulated(),
            venue_b_simulated: quote_b.is_simulated(),
        }
    }
}

/// Buy on the cheaper venue, sell on the dearer one, if the gap clears the threshold.
pub fn decide_action(price_a: f64, price_b: f64, spread: f64, threshold: f64) -> Action {
    if spread <= threshold {
        Action::NoOpportunity
    } else if price_a < price_b {
        Action::BuyASellB
    } else {
        Action::BuyBSellA
    }
}

/// Net of fees, per `unit_size` shares. Never negative.
pub fn estimate_profit(spread: f64, fee_rate: f64, unit_size: f64) -> f64 {
    (spread - fee_rate).max(0.0) * unit_size
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn to_volume(volume: f64) -> u64 {
    if volume.is_finite() && volume > 0.0 {
        volume as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn builder() -> ObservationBuilder {
        ObservationBuilder::new(StrategyConfig::default())
    }

    fn at() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, 14, 0, 5)
            .unwrap()
    }

    #[test]
    fn test_opportunity_buy_a() {
        let obs = builder().build(
            &PriceQuote::remote(0.40, 1500.7),
            &PriceQuote::remote(0.46, 800.0),
            at(),
        );

        assert_eq!(obs.spread, 0.06);
        assert_eq!(obs.action, Action::BuyASellB);
        assert_eq!(obs.estimated_profit, 4.5);
        assert_eq!(obs.venue_a_volume, 1500);
        assert_eq!(obs.venue_b_volume, 800);
        assert!(!obs.venue_a_simulated && !obs.venue_b_simulated);
    }

    #[test]
    fn test_no_opportunity_below_threshold() {
        let obs = builder().build(
            &PriceQuote::remote(0.50, 0.0),
            &PriceQuote::remote(0.51, 0.0),
            at(),
        );

        assert_eq!(obs.spread, 0.01);
        assert_eq!(obs.action, Action::NoOpportunity);
        assert_eq!(obs.estimated_profit, 0.0);
    }

    #[test]
    fn test_spread_at_threshold_is_not_an_opportunity() {
        let obs = builder().build(
            &PriceQuote::remote(0.53, 0.0),
            &PriceQuote::remote(0.50, 0.0),
            at(),
        );

        assert_eq!(obs.spread, 0.03);
        assert_eq!(obs.action, Action::NoOpportunity);
        // fees are independent of the threshold
        assert_eq!(obs.estimated_profit, 1.5);
    }

    #[test]
    fn test_buy_b_when_b_is_cheaper() {
        let obs = builder().build(
            &PriceQuote::remote(0.58, 0.0),
            &PriceQuote::simulated(0.47123, 0.0),
            at(),
        );

        assert_eq!(obs.venue_b_price, 0.4712);
        assert_eq!(obs.spread, 0.1088);
        assert_eq!(obs.action, Action::BuyBSellA);
        assert_eq!(obs.estimated_profit, 9.38);
        assert!(obs.venue_b_simulated);
    }

    #[test]
    fn test_equal_prices_have_zero_spread() {
        let obs = builder().build(
            &PriceQuote::remote(0.5, 0.0),
            &PriceQuote::remote(0.5, 0.0),
            at(),
        );

        assert_eq!(obs.spread, 0.0);
        assert_eq!(obs.action, Action::NoOpportunity);
    }

    #[test]
    fn test_spread_and_profit_properties() {
        let config = StrategyConfig::default();
        let b = ObservationBuilder::new(config.clone());
        let mut last_profit = 0.0;

        for i in 0..=100 {
            let a = 0.5;
            let other = 0.5 + i as f64 * 0.005;
            let obs = b.build(&PriceQuote::remote(a, 0.0), &PriceQuote::remote(other, 0.0), at());

            assert!(obs.spread >= 0.0);
            assert_eq!(obs.spread == 0.0, obs.venue_a_price == obs.venue_b_price);
            assert_eq!(obs.action == Action::NoOpportunity, obs.spread <= config.spread_threshold);
            assert!(obs.estimated_profit >= last_profit);
            last_profit = obs.estimated_profit;
        }
    }

    #[test]
    fn test_configurable_fee_and_unit_size() {
        let b = ObservationBuilder::new(StrategyConfig {
            spread_threshold: 0.05,
            fee_rate: 0.02,
            unit_size: 1000.0,
        });
        let obs = b.build(&PriceQuote::remote(0.30, 0.0), &PriceQuote::remote(0.34, 0.0), at());

        assert_eq!(obs.action, Action::NoOpportunity);
        assert_eq!(obs.estimated_profit, 20.0);
    }

    #[test]
    fn test_captured_at_truncated_to_seconds() {
        let now = at().with_nanosecond(750_000_000).unwrap();
        let obs = builder().build(&PriceQuote::remote(0.5, 0.0), &PriceQuote::remote(0.5, 0.0), now);

        assert_eq!(obs.captured_at, at());
        assert_eq!(obs.action.to_string(), "NO_OPPORTUNITY");
    }
}
