//! The minimal in-memory `Market` the broker needs to resolve a price.
//! This is not the demo market simulator (no simulated latency or
//! scripted price paths) — it's the opaque price source spec §6's broker
//! interface requires to exist at all.

use async_trait::async_trait;
use parking_lot::RwLock;
use rebalance_api::{Market, Symbol};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InMemoryMarket {
    prices: RwLock<HashMap<Symbol, Decimal>>,
}

impl InMemoryMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: Symbol, price: Decimal) {
        self.prices.write().insert(symbol, price);
    }
}

#[async_trait]
impl Market for InMemoryMarket {
    async fn price_of(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.read().get(symbol).copied()
    }

    async fn has(&self, symbol: &Symbol) -> bool {
        self.prices.read().contains_key(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn returns_none_for_unknown_symbol() {
        let market = InMemoryMarket::new();
        let symbol = Symbol::new("AAAA").unwrap();
        assert_eq!(market.price_of(&symbol).await, None);
        assert!(!market.has(&symbol).await);
    }

    #[tokio::test]
    async fn returns_set_price() {
        let market = InMemoryMarket::new();
        let symbol = Symbol::new("AAAA").unwrap();
        market.set_price(symbol.clone(), dec!(100));
        assert_eq!(market.price_of(&symbol).await, Some(dec!(100)));
        assert!(market.has(&symbol).await);
    }
}
