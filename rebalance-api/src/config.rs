//! Process-wide, immutable configuration (spec §6).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Central thresholds and limits. Construct with [`EngineConfig::default`]
/// for spec defaults, then override individual fields with the `with_*`
/// builders, mirroring `StrategyConfig::with_cash_buffer` in the teacher's
/// configuration model.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub min_investment: Decimal,
    pub max_portfolio_value: Decimal,
    pub max_quantity: Decimal,
    pub price_change_alert_threshold: Decimal,
    pub rebalance_deviation_threshold: Decimal,
    pub rebalance_lock_ttl: Duration,
    pub rollback_max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_price: dec!(0.01),
            max_price: dec!(1000000),
            min_investment: dec!(1),
            max_portfolio_value: dec!(10000000),
            max_quantity: dec!(1000000),
            price_change_alert_threshold: dec!(0.01),
            rebalance_deviation_threshold: dec!(0.02),
            rebalance_lock_ttl: Duration::from_secs(6 * 60 * 60),
            rollback_max_attempts: 3,
        }
    }
}

impl EngineConfig {
    pub fn with_price_change_alert_threshold(mut self, threshold: Decimal) -> Self {
        self.price_change_alert_threshold = threshold;
        self
    }

    pub fn with_rebalance_deviation_threshold(mut self, threshold: Decimal) -> Self {
        self.rebalance_deviation_threshold = threshold;
        self
    }

    pub fn with_rebalance_lock_ttl(mut self, ttl: Duration) -> Self {
        self.rebalance_lock_ttl = ttl;
        self
    }

    pub fn with_rollback_max_attempts(mut self, attempts: u32) -> Self {
        self.rollback_max_attempts = attempts;
        self
    }

    pub fn price_in_bounds(&self, price: Decimal) -> bool {
        price.is_sign_positive() && price >= self.min_price && price <= self.max_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.min_price, dec!(0.01));
        assert_eq!(cfg.max_price, dec!(1000000));
        assert_eq!(cfg.rebalance_deviation_threshold, dec!(0.02));
        assert_eq!(cfg.rollback_max_attempts, 3);
        assert_eq!(cfg.rebalance_lock_ttl, Duration::from_secs(21600));
    }
}
