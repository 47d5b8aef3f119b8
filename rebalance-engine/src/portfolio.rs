//! The portfolio state machine (spec §4.4): a validated, fixed set of
//! target allocations, an opening batch of buys, and a locked rebalance
//! cycle triggered by price movement.

use futures::future::join_all;
use log::{info, warn};
use rebalance_api::decimal::{quantize_money, quantize_percent, quantize_quantity};
use rebalance_api::{Broker, EngineConfig, OrderStatus, Side, Stock, Symbol};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::allocated_stock::AllocatedStock;
use crate::error::{ConfigError, FailedOperation, PortfolioError};
use crate::lock::{Acquisition, RebalanceLock};
use crate::registry::PortfolioRegistry;

/// A validated set of target allocations, ready to become a [`Portfolio`].
/// Construction is the only place the invariants in spec §4.4's
/// "Portfolio Config" are checked; once built, a `Portfolio` trusts them.
pub struct PortfolioConfig {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) initial_investment: Decimal,
    pub(crate) allocations: Vec<(Arc<Stock>, Decimal)>,
}

impl PortfolioConfig {
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        initial_investment: Decimal,
        allocations: Vec<(Arc<Stock>, Decimal)>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        if allocations.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut seen = HashMap::new();
        let mut sum = Decimal::ZERO;
        for (stock, percent) in &allocations {
            let symbol = stock.symbol().clone();
            if seen.insert(symbol.clone(), ()).is_some() {
                return Err(ConfigError::DuplicateSymbol(symbol));
            }
            if *percent <= Decimal::ZERO || *percent > Decimal::ONE {
                return Err(ConfigError::InvalidAllocationPercent {
                    symbol,
                    percent: percent.to_string(),
                });
            }
            sum += *percent;
        }

        if quantize_percent(sum) != Decimal::ONE {
            return Err(ConfigError::AllocationsDoNotSumToOne(sum.to_string()));
        }

        if initial_investment < config.min_investment
            || initial_investment > config.max_portfolio_value
        {
            return Err(ConfigError::InvestmentOutOfBounds(
                initial_investment.to_string(),
            ));
        }

        Ok(Self {
            id,
            name: name.into(),
            initial_investment,
            allocations,
        })
    }
}

pub struct Portfolio {
    id: Uuid,
    name: String,
    initial_investment: Decimal,
    allocations: Vec<AllocatedStock>,
    symbol_index: HashMap<Symbol, usize>,
    broker: Arc<dyn Broker>,
    config: EngineConfig,
    lock: RebalanceLock,
    stale: AtomicBool,
    retry_attempts: AtomicU32,
}

impl std::fmt::Debug for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portfolio")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stale", &self.stale.load(Ordering::Relaxed))
            .finish()
    }
}

impl Portfolio {
    pub fn new(config: PortfolioConfig, broker: Arc<dyn Broker>, engine_config: EngineConfig) -> Arc<Self> {
        let mut symbol_index = HashMap::with_capacity(config.allocations.len());
        let allocations = config
            .allocations
            .into_iter()
            .enumerate()
            .map(|(i, (stock, percent))| {
                symbol_index.insert(stock.symbol().clone(), i);
                AllocatedStock::new(stock, percent, Decimal::ZERO)
            })
            .collect();

        Arc::new(Self {
            id: config.id,
            name: config.name,
            initial_investment: config.initial_investment,
            allocations,
            symbol_index,
            broker,
            config: engine_config,
            lock: RebalanceLock::new(),
            stale: AtomicBool::new(false),
            retry_attempts: AtomicU32::new(0),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.load(Ordering::Acquire)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.allocations.iter().map(|a| a.symbol())
    }

    pub fn holds(&self, symbol: &Symbol) -> bool {
        self.symbol_index.contains_key(symbol)
    }

    fn failed_operations_from(errors: Vec<(Symbol, rebalance_api::ApiError)>) -> Vec<FailedOperation> {
        errors
            .into_iter()
            .map(|(symbol, error)| FailedOperation::from_api_error(symbol, &error))
            .collect()
    }

    /// Opens the portfolio: buys each allocation's target dollar amount as
    /// a single batch. On any failure the whole batch is rolled back; if
    /// the rollback itself cannot fully reverse, the portfolio is marked
    /// stale and will reject every future mutation.
    pub async fn initialize(self: &Arc<Self>, registry: &PortfolioRegistry) -> Result<(), PortfolioError> {
        let batch_id = rebalance_api::BatchId::new();

        let tasks = self.allocations.iter().map(|allocation| {
            let broker = Arc::clone(&self.broker);
            let symbol = allocation.symbol().clone();
            let amount = quantize_money(self.initial_investment * allocation.target_percent());
            async move {
                let outcome = broker
                    .buy_by_amount(&symbol, amount, Some(batch_id), None)
                    .await;
                (symbol, outcome)
            }
        });

        let results = join_all(tasks).await;

        let mut errors = Vec::new();
        let mut successes = Vec::new();
        for (symbol, result) in results {
            match result {
                Ok(outcome) if outcome.is_success() => successes.push((symbol, outcome)),
                Ok(outcome) => errors.push((
                    symbol,
                    rebalance_api::ApiError::BuyFailed {
                        symbol: outcome.symbol.clone(),
                        batch_id: outcome.batch_id,
                        operation_id: outcome.operation_id,
                        reason: outcome.error.clone().unwrap_or_default(),
                    },
                )),
                Err(err) => errors.push((symbol, err)),
            }
        }

        if errors.is_empty() {
            for (symbol, outcome) in successes {
                if let Some(&i) = self.symbol_index.get(&symbol) {
                    self.allocations[i].set_held_quantity(outcome.realized_quantity);
                }
            }
            registry.register(self);
            info!("portfolio {} ({}) initialized", self.name, self.id);
            return Ok(());
        }

        let rolled_back = self.broker.rollback_batch(batch_id).await;
        let failed_operations = Self::failed_operations_from(errors);

        if rolled_back {
            warn!(
                "portfolio {} ({}) failed to open; rollback succeeded",
                self.name, self.id
            );
            Err(PortfolioError::PortfolioInitializationFailed { failed_operations })
        } else {
            self.stale.store(true, Ordering::Release);
            warn!(
                "portfolio {} ({}) failed to open and rollback failed; marked stale",
                self.name, self.id
            );
            Err(PortfolioError::PortfolioStale { failed_operations })
        }
    }

    /// Entry point for a price-change-triggered rebalance evaluation
    /// (spec §4.4.2, §4.6). Stale portfolios reject outright; a
    /// concurrent rebalance already in flight is skipped, not queued.
    pub async fn rebalance(&self) -> Result<(), PortfolioError> {
        if self.is_stale() {
            return Err(PortfolioError::PortfolioStale {
                failed_operations: Vec::new(),
            });
        }

        match self.lock.try_acquire(self.config.rebalance_lock_ttl) {
            Acquisition::Skip => {
                info!("portfolio {} ({}) rebalance skipped; already in flight", self.name, self.id);
                Ok(())
            }
            Acquisition::Acquired => {
                let result = self.rebalance_locked().await;
                self.lock.release();
                result
            }
        }
    }

    async fn rebalance_locked(&self) -> Result<(), PortfolioError> {
        let snapshot: Vec<(Decimal, Decimal, Decimal)> = self
            .allocations
            .iter()
            .map(|a| (a.current_price(), a.held_quantity(), a.target_percent()))
            .collect();

        let total_value: Decimal = snapshot
            .iter()
            .map(|(price, quantity, _)| price * quantity)
            .sum();

        if total_value <= Decimal::ZERO {
            return Ok(());
        }

        let max_deviation = snapshot
            .iter()
            .map(|(price, quantity, target_percent)| {
                let current_percent = (price * quantity) / total_value;
                (current_percent - target_percent).abs()
            })
            .fold(Decimal::ZERO, |acc, v| if v > acc { v } else { acc });

        if max_deviation < self.config.rebalance_deviation_threshold {
            info!(
                "portfolio {} ({}) within deviation threshold ({:.4} < {:.4}); no rebalance",
                self.name, self.id, max_deviation, self.config.rebalance_deviation_threshold
            );
            return Ok(());
        }

        let deltas: Vec<Decimal> = self
            .allocations
            .iter()
            .zip(snapshot.iter())
            .map(|(_, (price, quantity, target_percent))| {
                let target_value = total_value * target_percent;
                let target_quantity = quantize_quantity(target_value / price);
                target_quantity - quantity
            })
            .collect();

        let batch_id = rebalance_api::BatchId::new();

        // Both phases are issued and gathered before either is applied to
        // `held_quantity` — a failure in the buy phase must roll back the
        // sells too, and that can only happen cleanly if nothing has been
        // committed to portfolio state yet.
        let sell_outcomes = self.execute_phase(&deltas, Side::Sell, batch_id).await;
        let buy_outcomes = self.execute_phase(&deltas, Side::Buy, batch_id).await;

        let mut errors = Self::collect_errors(&sell_outcomes, Side::Sell);
        errors.extend(Self::collect_errors(&buy_outcomes, Side::Buy));

        if !errors.is_empty() {
            return Err(self.fail_rebalance(errors, batch_id).await);
        }

        self.apply_phase(&sell_outcomes, Side::Sell);
        self.apply_phase(&buy_outcomes, Side::Buy);

        self.retry_attempts.store(0, Ordering::Release);
        info!("portfolio {} ({}) rebalanced", self.name, self.id);
        Ok(())
    }

    /// Concurrently issues every order on `side` implied by `deltas`.
    /// Allocations whose delta doesn't match `side` (or is zero) are
    /// skipped rather than issued as no-op trades.
    async fn execute_phase(
        &self,
        deltas: &[Decimal],
        side: Side,
        batch_id: rebalance_api::BatchId,
    ) -> Vec<(Symbol, Result<rebalance_api::OrderOutcome, rebalance_api::ApiError>)> {
        let tasks = self.allocations.iter().zip(deltas.iter()).filter_map(|(allocation, delta)| {
            let is_relevant = match side {
                Side::Sell => *delta < Decimal::ZERO,
                Side::Buy => *delta > Decimal::ZERO,
            };
            if !is_relevant {
                return None;
            }
            let quantity = delta.abs();
            let symbol = allocation.symbol().clone();
            let broker = Arc::clone(&self.broker);
            Some(async move {
                let outcome = match side {
                    Side::Sell => broker.sell_by_quantity(&symbol, quantity, Some(batch_id), None).await,
                    Side::Buy => broker.buy_by_quantity(&symbol, quantity, Some(batch_id), None).await,
                };
                (symbol, outcome)
            })
        });

        join_all(tasks).await
    }

    /// Pure extraction of the failed orders in `outcomes`, with no side
    /// effects — safe to call on both phases before deciding whether to
    /// roll back or apply anything.
    fn collect_errors(
        outcomes: &[(Symbol, Result<rebalance_api::OrderOutcome, rebalance_api::ApiError>)],
        side: Side,
    ) -> Vec<(Symbol, rebalance_api::ApiError)> {
        outcomes
            .iter()
            .filter_map(|(symbol, result)| match result {
                Ok(outcome) if !outcome.is_success() => {
                    let reason = outcome.error.clone().unwrap_or_default();
                    let api_error = match side {
                        Side::Sell => rebalance_api::ApiError::SellFailed {
                            symbol: outcome.symbol.clone(),
                            batch_id: outcome.batch_id,
                            operation_id: outcome.operation_id,
                            reason,
                        },
                        Side::Buy => rebalance_api::ApiError::BuyFailed {
                            symbol: outcome.symbol.clone(),
                            batch_id: outcome.batch_id,
                            operation_id: outcome.operation_id,
                            reason,
                        },
                    };
                    Some((symbol.clone(), api_error))
                }
                Err(err) => Some((symbol.clone(), err.clone())),
                _ => None,
            })
            .collect()
    }

    /// Rolls back the whole batch (sells and buys together) and updates
    /// retry/staleness bookkeeping. Called only once per rebalance attempt,
    /// after both phases have been gathered, so a failing buy leg reverses
    /// the sells alongside it rather than leaving them applied.
    async fn fail_rebalance(
        &self,
        errors: Vec<(Symbol, rebalance_api::ApiError)>,
        batch_id: rebalance_api::BatchId,
    ) -> PortfolioError {
        let rolled_back = self.broker.rollback_batch(batch_id).await;
        let failed_operations = Self::failed_operations_from(errors);
        let attempt = self.retry_attempts.fetch_add(1, Ordering::AcqRel) + 1;

        if rolled_back {
            warn!(
                "portfolio {} ({}) rebalance attempt {} failed; rollback succeeded",
                self.name, self.id, attempt
            );
            PortfolioError::PortfolioRetry { failed_operations, attempt }
        } else {
            self.stale.store(true, Ordering::Release);
            warn!(
                "portfolio {} ({}) rebalance rollback failed; marked stale",
                self.name, self.id
            );
            PortfolioError::PortfolioStale { failed_operations }
        }
    }

    fn apply_phase(
        &self,
        outcomes: &[(Symbol, Result<rebalance_api::OrderOutcome, rebalance_api::ApiError>)],
        side: Side,
    ) {
        for (symbol, result) in outcomes {
            let Ok(outcome) = result else { continue };
            if outcome.status != OrderStatus::Success {
                continue;
            }
            let Some(&i) = self.symbol_index.get(symbol) else { continue };
            let allocation = &self.allocations[i];
            let current = allocation.held_quantity();
            let next = match side {
                Side::Sell => current - outcome.realized_quantity,
                Side::Buy => current + outcome.realized_quantity,
            };
            allocation.set_held_quantity(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomic_broker::AtomicBatchBroker;
    use crate::market::RebalancingMarket;
    use rebalance_api::Market;
    use rust_decimal_macros::dec;

    fn symbol(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    /// Builds a portfolio whose broker is an `AtomicBatchBroker` over the
    /// `RebalancingMarket` itself, rather than a separately-maintained
    /// `Market` — the broker resolves fills from the exact same `Stock`
    /// prices a rebalance decision is computed against, so there is only
    /// one price to update in tests that move a stock mid-test.
    fn two_stock_portfolio(
        prices: (Decimal, Decimal),
        percents: (Decimal, Decimal),
    ) -> (Arc<Portfolio>, Arc<RebalancingMarket>, EngineConfig) {
        let engine_config = EngineConfig::default();
        let market = Arc::new(RebalancingMarket::new(
            Arc::new(PortfolioRegistry::new()),
            engine_config.clone(),
        ));
        let stock_a = market.add_stock(symbol("AAAA"), prices.0).unwrap();
        let stock_b = market.add_stock(symbol("BBBB"), prices.1).unwrap();

        let broker = Arc::new(AtomicBatchBroker::new(
            market.clone() as Arc<dyn Market>,
            engine_config.clone(),
        ));

        let config = PortfolioConfig::new(
            Uuid::new_v4(),
            "Balanced",
            dec!(10000),
            vec![(stock_a, percents.0), (stock_b, percents.1)],
            &engine_config,
        )
        .unwrap();

        (Portfolio::new(config, broker, engine_config.clone()), market, engine_config)
    }

    #[test]
    fn config_rejects_allocations_not_summing_to_one() {
        let engine_config = EngineConfig::default();
        let stock = Arc::new(Stock::new(symbol("AAAA"), dec!(100), &engine_config).unwrap());
        let err = PortfolioConfig::new(
            Uuid::new_v4(),
            "Bad",
            dec!(1000),
            vec![(stock, dec!(0.5))],
            &engine_config,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::AllocationsDoNotSumToOne(_)));
    }

    #[test]
    fn config_rejects_duplicate_symbols() {
        let engine_config = EngineConfig::default();
        let stock_a = Arc::new(Stock::new(symbol("AAAA"), dec!(100), &engine_config).unwrap());
        let stock_b = Arc::new(Stock::new(symbol("AAAA"), dec!(100), &engine_config).unwrap());
        let err = PortfolioConfig::new(
            Uuid::new_v4(),
            "Dup",
            dec!(1000),
            vec![(stock_a, dec!(0.5)), (stock_b, dec!(0.5))],
            &engine_config,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSymbol(_)));
    }

    #[test]
    fn config_rejects_investment_out_of_bounds() {
        let engine_config = EngineConfig::default();
        let stock = Arc::new(Stock::new(symbol("AAAA"), dec!(100), &engine_config).unwrap());
        let err = PortfolioConfig::new(
            Uuid::new_v4(),
            "TooSmall",
            dec!(0),
            vec![(stock, dec!(1))],
            &engine_config,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvestmentOutOfBounds(_)));
    }

    #[tokio::test]
    async fn initialize_buys_target_amounts_and_registers() {
        let (portfolio, _market, _config) =
            two_stock_portfolio((dec!(100), dec!(50)), (dec!(0.6), dec!(0.4)));
        let registry = PortfolioRegistry::new();

        portfolio.initialize(&registry).await.unwrap();

        assert_eq!(
            portfolio.allocations[0].held_quantity(),
            dec!(60) // 6000 / 100
        );
        assert_eq!(
            portfolio.allocations[1].held_quantity(),
            dec!(80) // 4000 / 50
        );
        assert_eq!(registry.get_by_symbol(&symbol("AAAA")).len(), 1);
        assert!(!portfolio.is_stale());
    }

    #[tokio::test]
    async fn initialize_rolls_back_when_one_leg_fails() {
        let engine_config = EngineConfig::default();
        let market = Arc::new(RebalancingMarket::new(
            Arc::new(PortfolioRegistry::new()),
            engine_config.clone(),
        ));
        let stock_a = market.add_stock(symbol("AAAA"), dec!(100)).unwrap();
        // BBBB deliberately not registered with the market, so the broker
        // can't resolve its price and the buy fails.
        let stock_b = Arc::new(Stock::new(symbol("BBBB"), dec!(50), &engine_config).unwrap());
        let broker = Arc::new(AtomicBatchBroker::new(
            market.clone() as Arc<dyn Market>,
            engine_config.clone(),
        ));
        let config = PortfolioConfig::new(
            Uuid::new_v4(),
            "Broken",
            dec!(10000),
            vec![(stock_a, dec!(0.5)), (stock_b, dec!(0.5))],
            &engine_config,
        )
        .unwrap();
        let portfolio = Portfolio::new(config, broker, engine_config);
        let registry = PortfolioRegistry::new();

        let err = portfolio.initialize(&registry).await.unwrap_err();
        assert!(matches!(err, PortfolioError::PortfolioInitializationFailed { .. }));
        assert_eq!(portfolio.allocations[0].held_quantity(), Decimal::ZERO);
        assert!(registry.get_by_symbol(&symbol("AAAA")).is_empty());
    }

    #[tokio::test]
    async fn rebalance_is_a_noop_below_deviation_threshold() {
        let (portfolio, _market, _config) =
            two_stock_portfolio((dec!(100), dec!(100)), (dec!(0.5), dec!(0.5)));
        let registry = PortfolioRegistry::new();
        portfolio.initialize(&registry).await.unwrap();

        let before_a = portfolio.allocations[0].held_quantity();
        let before_b = portfolio.allocations[1].held_quantity();

        portfolio.rebalance().await.unwrap();

        assert_eq!(portfolio.allocations[0].held_quantity(), before_a);
        assert_eq!(portfolio.allocations[1].held_quantity(), before_b);
    }

    #[tokio::test]
    async fn rebalance_sells_and_buys_to_restore_target_weights() {
        let (portfolio, _market, _config) =
            two_stock_portfolio((dec!(100), dec!(100)), (dec!(0.5), dec!(0.5)));
        let registry = PortfolioRegistry::new();
        portfolio.initialize(&registry).await.unwrap();
        // 50 shares of AAAA and 50 of BBBB at parity.

        // AAAA doubles: now badly overweight relative to target. The
        // broker resolves fills through the same `Stock` the portfolio
        // was built on, so this single update is visible to both the
        // deviation check and the fill.
        portfolio.allocations[0].stock().set_price(dec!(200), &EngineConfig::default()).unwrap();

        portfolio.rebalance().await.unwrap();

        let total_value = portfolio.allocations[0].held_quantity() * dec!(200)
            + portfolio.allocations[1].held_quantity() * dec!(100);
        let weight_a = (portfolio.allocations[0].held_quantity() * dec!(200)) / total_value;
        assert!((weight_a - dec!(0.5)).abs() < dec!(0.01));
    }

    #[tokio::test]
    async fn concurrent_rebalance_attempts_skip_rather_than_queue() {
        let (portfolio, _market, _config) =
            two_stock_portfolio((dec!(100), dec!(100)), (dec!(0.5), dec!(0.5)));
        let registry = PortfolioRegistry::new();
        portfolio.initialize(&registry).await.unwrap();

        let acquired = portfolio.lock.try_acquire(portfolio.config.rebalance_lock_ttl);
        assert_eq!(acquired, Acquisition::Acquired);

        // A second rebalance call must observe the lock held and return
        // immediately without touching holdings.
        portfolio.rebalance().await.unwrap();
        portfolio.lock.release();
    }

    #[tokio::test]
    async fn stale_portfolio_rejects_further_rebalances() {
        let (portfolio, _market, _config) =
            two_stock_portfolio((dec!(100), dec!(100)), (dec!(0.5), dec!(0.5)));
        let registry = PortfolioRegistry::new();
        portfolio.initialize(&registry).await.unwrap();

        portfolio.stale.store(true, Ordering::Release);

        let err = portfolio.rebalance().await.unwrap_err();
        assert!(matches!(err, PortfolioError::PortfolioStale { .. }));
    }

    /// A broker whose buy/sell legs and rollback outcome are scripted
    /// directly, independent of `atomic-broker`'s own price-driven
    /// behavior — lets a test force exactly one leg of a rebalance batch
    /// to fail and control whether the ensuing rollback succeeds.
    struct ScriptedBroker {
        fail_buy_symbol: Symbol,
        rollback_succeeds: bool,
    }

    #[async_trait::async_trait]
    impl Broker for ScriptedBroker {
        async fn buy_by_amount(
            &self,
            symbol: &Symbol,
            cash_amount: Decimal,
            batch_id: Option<rebalance_api::BatchId>,
            _operation_id: Option<rebalance_api::OperationId>,
        ) -> Result<rebalance_api::OrderOutcome, rebalance_api::ApiError> {
            let request = rebalance_api::OrderRequest::buy_by_amount(symbol.clone(), cash_amount, batch_id);
            let quantity = quantize_quantity(cash_amount / dec!(100));
            Ok(rebalance_api::OrderOutcome::success(&request, dec!(100), quantity))
        }

        async fn buy_by_quantity(
            &self,
            symbol: &Symbol,
            quantity: Decimal,
            batch_id: Option<rebalance_api::BatchId>,
            operation_id: Option<rebalance_api::OperationId>,
        ) -> Result<rebalance_api::OrderOutcome, rebalance_api::ApiError> {
            if *symbol == self.fail_buy_symbol {
                return Err(rebalance_api::ApiError::BuyFailed {
                    symbol: symbol.clone(),
                    batch_id,
                    operation_id: operation_id.unwrap_or_default(),
                    reason: "scripted failure".into(),
                });
            }
            let request = rebalance_api::OrderRequest::buy_by_quantity(symbol.clone(), quantity, batch_id);
            Ok(rebalance_api::OrderOutcome::success(&request, dec!(100), quantity))
        }

        async fn sell_by_amount(
            &self,
            symbol: &Symbol,
            cash_amount: Decimal,
            batch_id: Option<rebalance_api::BatchId>,
            _operation_id: Option<rebalance_api::OperationId>,
        ) -> Result<rebalance_api::OrderOutcome, rebalance_api::ApiError> {
            let request = rebalance_api::OrderRequest::sell_by_amount(symbol.clone(), cash_amount, batch_id);
            let quantity = quantize_quantity(cash_amount / dec!(100));
            Ok(rebalance_api::OrderOutcome::success(&request, dec!(100), quantity))
        }

        async fn sell_by_quantity(
            &self,
            symbol: &Symbol,
            quantity: Decimal,
            batch_id: Option<rebalance_api::BatchId>,
            _operation_id: Option<rebalance_api::OperationId>,
        ) -> Result<rebalance_api::OrderOutcome, rebalance_api::ApiError> {
            let request = rebalance_api::OrderRequest::sell_by_quantity(symbol.clone(), quantity, batch_id);
            Ok(rebalance_api::OrderOutcome::success(&request, dec!(100), quantity))
        }

        async fn rollback_batch(&self, _batch_id: rebalance_api::BatchId) -> bool {
            self.rollback_succeeds
        }
    }

    /// Builds a two-stock portfolio, initializes it at parity (50 shares
    /// each, since `ScriptedBroker` fills every buy at a fixed price of
    /// 100 regardless of the allocation's own `Stock` price), then bumps
    /// AAAA's price so a subsequent rebalance needs to sell AAAA and buy
    /// BBBB — the buy is the leg the tests below force to fail.
    async fn portfolio_needing_sell_and_buy(rollback_succeeds: bool) -> Arc<Portfolio> {
        let engine_config = EngineConfig::default();
        let stock_a = Arc::new(Stock::new(symbol("AAAA"), dec!(100), &engine_config).unwrap());
        let stock_b = Arc::new(Stock::new(symbol("BBBB"), dec!(100), &engine_config).unwrap());
        let broker = Arc::new(ScriptedBroker {
            fail_buy_symbol: symbol("BBBB"),
            rollback_succeeds,
        });
        let config = PortfolioConfig::new(
            Uuid::new_v4(),
            "ScriptedPair",
            dec!(10000),
            vec![(stock_a, dec!(0.5)), (stock_b, dec!(0.5))],
            &engine_config,
        )
        .unwrap();
        let portfolio = Portfolio::new(config, broker, engine_config.clone());
        portfolio.initialize(&PortfolioRegistry::new()).await.unwrap();

        // Rebalance only needs the internal `Stock` price snapshot, not
        // a broker-side market, so this is enough to create deviation:
        // AAAA doubles, so the portfolio is overweight AAAA and needs to
        // sell it while buying BBBB back to parity.
        portfolio.allocations[0]
            .stock()
            .set_price(dec!(200), &engine_config)
            .unwrap();

        portfolio
    }

    #[tokio::test]
    async fn rebalance_partial_failure_restores_pre_rebalance_holdings() {
        let portfolio = portfolio_needing_sell_and_buy(true).await;

        let before_a = portfolio.allocations[0].held_quantity();
        let before_b = portfolio.allocations[1].held_quantity();
        assert_eq!(before_a, dec!(50));
        assert_eq!(before_b, dec!(50));

        let err = portfolio.rebalance().await.unwrap_err();
        assert!(matches!(err, PortfolioError::PortfolioRetry { attempt: 1, .. }));

        // The sell leg succeeded and the buy leg failed, but since the
        // whole batch rolled back, neither allocation's held quantity may
        // have moved from its pre-rebalance value.
        assert_eq!(portfolio.allocations[0].held_quantity(), before_a);
        assert_eq!(portfolio.allocations[1].held_quantity(), before_b);
        assert!(!portfolio.is_stale());
    }

    #[tokio::test]
    async fn rebalance_marks_stale_when_rollback_fails() {
        let portfolio = portfolio_needing_sell_and_buy(false).await;

        let before_a = portfolio.allocations[0].held_quantity();
        let before_b = portfolio.allocations[1].held_quantity();

        let err = portfolio.rebalance().await.unwrap_err();
        assert!(matches!(err, PortfolioError::PortfolioStale { .. }));

        assert_eq!(portfolio.allocations[0].held_quantity(), before_a);
        assert_eq!(portfolio.allocations[1].held_quantity(), before_b);
        assert!(portfolio.is_stale());

        let err = portfolio.rebalance().await.unwrap_err();
        assert!(matches!(err, PortfolioError::PortfolioStale { .. }));
    }
}
