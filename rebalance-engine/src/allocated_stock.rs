//! A target slot within a portfolio: a stock reference, its target
//! allocation percentage, and the currently-held quantity (spec §3
//! "Allocated Stock").

use parking_lot::Mutex;
use rebalance_api::{decimal::quantize_percent, Stock, Symbol};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug)]
pub struct AllocatedStock {
    stock: Arc<Stock>,
    target_percent: Decimal,
    held_quantity: Mutex<Decimal>,
}

impl AllocatedStock {
    /// `target_percent` is stored already quantized to [`rebalance_api::decimal::PERCENT_SCALE`];
    /// callers validate `(0, 1]` and the cross-stock sum-to-1 invariant
    /// before constructing a [`crate::portfolio::Portfolio`] (see
    /// `PortfolioConfig::validate`).
    pub fn new(stock: Arc<Stock>, target_percent: Decimal, initial_quantity: Decimal) -> Self {
        Self {
            stock,
            target_percent: quantize_percent(target_percent),
            held_quantity: Mutex::new(initial_quantity),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        self.stock.symbol()
    }

    pub fn stock(&self) -> &Arc<Stock> {
        &self.stock
    }

    pub fn target_percent(&self) -> Decimal {
        self.target_percent
    }

    pub fn held_quantity(&self) -> Decimal {
        *self.held_quantity.lock()
    }

    pub fn set_held_quantity(&self, quantity: Decimal) {
        *self.held_quantity.lock() = quantity;
    }

    pub fn current_price(&self) -> Decimal {
        self.stock.current_price()
    }
}
