//! The symbol-indexed portfolio registry (spec §4.5): for each symbol,
//! the set of portfolios currently holding it, held by non-owning `Weak`
//! reference so registry membership never extends a portfolio's lifetime.

use log::warn;
use parking_lot::RwLock;
use rebalance_api::{stock::PriceChange, Symbol};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::portfolio::Portfolio;

#[derive(Debug, Default)]
pub struct PortfolioRegistry {
    by_symbol: RwLock<HashMap<Symbol, Vec<Weak<Portfolio>>>>,
}

impl PortfolioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `portfolio`'s membership under each of its current
    /// allocated symbols.
    pub fn register(&self, portfolio: &Arc<Portfolio>) {
        let mut index = self.by_symbol.write();
        for symbol in portfolio.symbols() {
            let entry = index.entry(symbol.clone()).or_default();
            if !entry
                .iter()
                .any(|existing| existing.ptr_eq(&Arc::downgrade(portfolio)))
            {
                entry.push(Arc::downgrade(portfolio));
            }
        }
    }

    /// Removes all membership entries for `portfolio`.
    pub fn unregister(&self, portfolio: &Arc<Portfolio>) {
        let mut index = self.by_symbol.write();
        let target = Arc::downgrade(portfolio);
        for symbol in portfolio.symbols() {
            if let Some(entry) = index.get_mut(symbol) {
                entry.retain(|weak| !weak.ptr_eq(&target));
            }
        }
    }

    /// Live portfolios currently holding `symbol`. Dead entries (whose
    /// portfolio was dropped by every external owner) are pruned
    /// opportunistically rather than eagerly — the registry never extends
    /// a portfolio's lifetime, but nothing forces it to notice a drop
    /// before the next lookup.
    pub fn get_by_symbol(&self, symbol: &Symbol) -> Vec<Arc<Portfolio>> {
        let index = self.by_symbol.read();
        match index.get(symbol) {
            Some(entries) => entries.iter().filter_map(Weak::upgrade).collect(),
            None => Vec::new(),
        }
    }

    /// For each live portfolio holding `symbol`, drives `rebalance()`
    /// concurrently. Spec §4.6/§7: one portfolio's failure is logged and
    /// does not affect another.
    pub async fn on_price_change(&self, symbol: &Symbol, change: &PriceChange) {
        let portfolios = self.get_by_symbol(symbol);
        if portfolios.is_empty() {
            return;
        }

        let tasks = portfolios.iter().map(|portfolio| {
            let portfolio = Arc::clone(portfolio);
            async move { portfolio.rebalance().await }
        });

        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                warn!(
                    "rebalance dispatch for symbol {} ({:+.4}%): {}",
                    symbol,
                    change.percent_change * rust_decimal::Decimal::ONE_HUNDRED,
                    err
                );
            }
        }
    }
}
