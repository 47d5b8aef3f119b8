//! Owns the tradable universe of [`Stock`]s and wires a price update to
//! the [`PortfolioRegistry`] dispatch it should trigger (spec §4.6). This
//! is the concrete answer to `Stock::set_price` returning a bare
//! `PriceChange` rather than notifying anything itself: the decoupling
//! lives in `rebalance-api`, the wiring lives here.
//!
//! `RebalancingMarket` also implements [`rebalance_api::Market`] directly
//! over its own `Stock` map, so a broker built against this market reads
//! the same price a rebalance decision was made against — there is no
//! second, independently-updated price store for a broker to drift out
//! of sync with (spec §2a/§4.6's price-update-to-fill path).

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use rebalance_api::{ApiError, EngineConfig, Market, Stock, Symbol};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::registry::PortfolioRegistry;

pub struct RebalancingMarket {
    stocks: RwLock<HashMap<Symbol, Arc<Stock>>>,
    registry: Arc<PortfolioRegistry>,
    config: EngineConfig,
}

impl RebalancingMarket {
    pub fn new(registry: Arc<PortfolioRegistry>, config: EngineConfig) -> Self {
        Self {
            stocks: RwLock::new(HashMap::new()),
            registry,
            config,
        }
    }

    /// Registers `symbol` at `initial_price`, creating its [`Stock`] if it
    /// doesn't already exist, and returns a handle to it for use when
    /// building [`crate::portfolio::PortfolioConfig`] allocations.
    pub fn add_stock(&self, symbol: Symbol, initial_price: Decimal) -> Result<Arc<Stock>, ApiError> {
        if let Some(existing) = self.stocks.read().get(&symbol) {
            return Ok(Arc::clone(existing));
        }
        let stock = Arc::new(Stock::new(symbol.clone(), initial_price, &self.config)?);
        self.stocks.write().insert(symbol, Arc::clone(&stock));
        Ok(stock)
    }

    pub fn stock(&self, symbol: &Symbol) -> Option<Arc<Stock>> {
        self.stocks.read().get(symbol).cloned()
    }

    /// Updates a stock's price and, when the move clears the alert
    /// threshold, dispatches a rebalance evaluation to every portfolio
    /// currently holding it.
    pub async fn set_price(&self, symbol: &Symbol, new_price: Decimal) -> Result<(), ApiError> {
        let stock = match self.stock(symbol) {
            Some(stock) => stock,
            None => return Err(ApiError::StockNotFound(symbol.clone())),
        };

        let change = stock.set_price(new_price, &self.config)?;
        match change {
            Some(change) => {
                debug!(
                    "{} moved {:+.4}%: {} -> {}",
                    symbol, change.percent_change, change.old_price, change.new_price
                );
                self.registry.on_price_change(symbol, &change).await;
            }
            None => {
                debug!("{} price updated to {} below alert threshold", symbol, new_price);
            }
        }
        Ok(())
    }
}

/// A broker constructed against `Arc<RebalancingMarket>` as its `Market`
/// resolves fills from the exact same `Stock` prices a rebalance decision
/// was computed from, rather than a separately-maintained price store.
#[async_trait]
impl Market for RebalancingMarket {
    async fn price_of(&self, symbol: &Symbol) -> Option<Decimal> {
        self.stock(symbol).map(|stock| stock.current_price())
    }

    async fn has(&self, symbol: &Symbol) -> bool {
        self.stocks.read().contains_key(symbol)
    }
}
