//! A named tradable asset with a validated, bounded current price
//! (spec §4.1).

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::error::ApiError;
use crate::symbol::Symbol;

/// Describes a price move large enough to clear the alert threshold.
/// `set_price` returns one of these rather than notifying a registry
/// directly — see `rebalance-engine::market` for the concrete wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceChange {
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub percent_change: Decimal,
}

#[derive(Debug)]
pub struct Stock {
    symbol: Symbol,
    price: RwLock<Decimal>,
}

impl Stock {
    pub fn new(symbol: Symbol, initial_price: Decimal, config: &EngineConfig) -> Result<Self, ApiError> {
        if !config.price_in_bounds(initial_price) {
            return Err(ApiError::invalid_price(initial_price));
        }
        Ok(Self {
            symbol,
            price: RwLock::new(initial_price),
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn current_price(&self) -> Decimal {
        *self.price.read()
    }

    /// Validates `new_price`, no-ops if it equals the current price, and
    /// otherwise updates it. Returns `Some(PriceChange)` only when the
    /// magnitude of the relative change clears
    /// `config.price_change_alert_threshold` — sub-noise drift is
    /// deliberately reported as `None` so callers don't dispatch a
    /// rebalance evaluation for it.
    pub fn set_price(
        &self,
        new_price: Decimal,
        config: &EngineConfig,
    ) -> Result<Option<PriceChange>, ApiError> {
        if !config.price_in_bounds(new_price) {
            return Err(ApiError::invalid_price(new_price));
        }

        let old_price = {
            let mut guard = self.price.write();
            let old = *guard;
            if old == new_price {
                return Ok(None);
            }
            *guard = new_price;
            old
        };

        let percent_change = (new_price - old_price) / old_price;
        if percent_change.abs() >= config.price_change_alert_threshold {
            Ok(Some(PriceChange {
                old_price,
                new_price,
                percent_change,
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("AAAA").unwrap()
    }

    #[test]
    fn rejects_out_of_bounds_initial_price() {
        let config = EngineConfig::default();
        assert!(Stock::new(symbol(), dec!(0.001), &config).is_err());
        assert!(Stock::new(symbol(), dec!(2000000), &config).is_err());
    }

    #[test]
    fn equal_price_is_a_silent_no_op() {
        let config = EngineConfig::default();
        let stock = Stock::new(symbol(), dec!(100), &config).unwrap();
        let result = stock.set_price(dec!(100), &config).unwrap();
        assert!(result.is_none());
        assert_eq!(stock.current_price(), dec!(100));
    }

    #[test]
    fn sub_threshold_change_updates_price_but_does_not_notify() {
        let config = EngineConfig::default();
        let stock = Stock::new(symbol(), dec!(250), &config).unwrap();
        // 0.8% move, below the 1% default alert threshold.
        let result = stock.set_price(dec!(252), &config).unwrap();
        assert!(result.is_none());
        assert_eq!(stock.current_price(), dec!(252));
    }

    #[test]
    fn above_threshold_change_notifies_with_percent_change() {
        let config = EngineConfig::default();
        let stock = Stock::new(symbol(), dec!(250), &config).unwrap();
        let change = stock.set_price(dec!(200), &config).unwrap().unwrap();
        assert_eq!(change.old_price, dec!(250));
        assert_eq!(change.new_price, dec!(200));
        assert_eq!(change.percent_change, dec!(-0.2));
    }

    #[test]
    fn rejects_invalid_new_price() {
        let config = EngineConfig::default();
        let stock = Stock::new(symbol(), dec!(100), &config).unwrap();
        assert!(stock.set_price(dec!(-5), &config).is_err());
        assert_eq!(stock.current_price(), dec!(100));
    }
}
