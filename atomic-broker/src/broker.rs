//! The Atomic Batch Broker (spec §4.3): a `Broker` implementation that
//! records every order outcome in a two-level batch table and performs
//! compensating rollback when a batch is not wholly successful.

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rebalance_api::{
    order::Denomination, ApiError, BatchId, Broker, EngineConfig, Market, OperationId,
    OrderOutcome, OrderRequest, Side, Symbol,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type BatchTable = HashMap<BatchId, HashMap<OperationId, OrderOutcome>>;

pub struct AtomicBatchBroker {
    market: Arc<dyn Market>,
    config: EngineConfig,
    batches: Mutex<BatchTable>,
}

impl AtomicBatchBroker {
    pub fn new(market: Arc<dyn Market>, config: EngineConfig) -> Self {
        Self {
            market,
            config,
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up a previously recorded outcome for `(batch_id, operation_id)`
    /// without re-executing anything — the idempotency check of spec §4.2.
    fn previously_recorded(
        &self,
        batch_id: Option<BatchId>,
        operation_id: OperationId,
    ) -> Option<OrderOutcome> {
        let batch_id = batch_id?;
        self.batches
            .lock()
            .get(&batch_id)
            .and_then(|ops| ops.get(&operation_id))
            .cloned()
    }

    fn record(&self, outcome: OrderOutcome) {
        if let Some(batch_id) = outcome.batch_id {
            self.batches
                .lock()
                .entry(batch_id)
                .or_default()
                .insert(outcome.operation_id, outcome);
        }
    }

    async fn fill(
        &self,
        symbol: &Symbol,
        side: Side,
        denomination: Denomination,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError> {
        let operation_id = operation_id.unwrap_or_default();

        if let Some(existing) = self.previously_recorded(batch_id, operation_id) {
            debug!(
                "replaying recorded outcome for op {} (batch {:?}), no re-execution",
                operation_id, batch_id
            );
            return Ok(existing);
        }

        let request = OrderRequest {
            operation_id,
            symbol: symbol.clone(),
            side,
            denomination,
            batch_id,
        };

        let price = match self.market.price_of(symbol).await {
            Some(price) => price,
            None => {
                let err = ApiError::StockNotFound(symbol.clone());
                let outcome = OrderOutcome::failure(&request, err.to_string());
                self.record(outcome);
                return Err(err);
            }
        };

        if price <= Decimal::ZERO {
            let err = match side {
                Side::Buy => ApiError::BuyFailed {
                    symbol: symbol.clone(),
                    batch_id,
                    operation_id,
                    reason: "non-positive market price".into(),
                },
                Side::Sell => ApiError::SellFailed {
                    symbol: symbol.clone(),
                    batch_id,
                    operation_id,
                    reason: "non-positive market price".into(),
                },
            };
            let outcome = OrderOutcome::failure(&request, err.to_string());
            self.record(outcome);
            return Err(err);
        }

        let realized_quantity = match denomination {
            Denomination::Amount(amount) => {
                rebalance_api::decimal::quantize_quantity(amount / price)
            }
            Denomination::Quantity(quantity) => rebalance_api::decimal::quantize_quantity(quantity),
        };

        if realized_quantity > self.config.max_quantity {
            let err = match side {
                Side::Buy => ApiError::BuyFailed {
                    symbol: symbol.clone(),
                    batch_id,
                    operation_id,
                    reason: format!("quantity {} exceeds per-order ceiling", realized_quantity),
                },
                Side::Sell => ApiError::SellFailed {
                    symbol: symbol.clone(),
                    batch_id,
                    operation_id,
                    reason: format!("quantity {} exceeds per-order ceiling", realized_quantity),
                },
            };
            let outcome = OrderOutcome::failure(&request, err.to_string());
            self.record(outcome);
            return Err(err);
        }

        let outcome = OrderOutcome::success(&request, price, realized_quantity);
        self.record(outcome.clone());
        Ok(outcome)
    }

    /// Builds the inverse of a successful outcome: a buy becomes a sell of
    /// the realized quantity at the current price, and vice versa, so the
    /// share count reverses exactly (spec §4.3, §9).
    async fn compensate_once(&self, outcome: &OrderOutcome) -> Result<OrderOutcome, ApiError> {
        let inverse_side = outcome.side.inverse();
        let denomination = Denomination::Quantity(outcome.realized_quantity);
        // The compensating trade is deliberately stand-alone (no batch id):
        // it must not itself become part of the batch it is reversing.
        self.fill(&outcome.symbol, inverse_side, denomination, None, None)
            .await
    }
}

#[async_trait]
impl Broker for AtomicBatchBroker {
    async fn buy_by_amount(
        &self,
        symbol: &Symbol,
        cash_amount: Decimal,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError> {
        self.fill(
            symbol,
            Side::Buy,
            Denomination::Amount(cash_amount),
            batch_id,
            operation_id,
        )
        .await
    }

    async fn buy_by_quantity(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError> {
        self.fill(
            symbol,
            Side::Buy,
            Denomination::Quantity(quantity),
            batch_id,
            operation_id,
        )
        .await
    }

    async fn sell_by_amount(
        &self,
        symbol: &Symbol,
        cash_amount: Decimal,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError> {
        self.fill(
            symbol,
            Side::Sell,
            Denomination::Amount(cash_amount),
            batch_id,
            operation_id,
        )
        .await
    }

    async fn sell_by_quantity(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError> {
        self.fill(
            symbol,
            Side::Sell,
            Denomination::Quantity(quantity),
            batch_id,
            operation_id,
        )
        .await
    }

    async fn rollback_batch(&self, batch_id: BatchId) -> bool {
        let to_reverse: Vec<OrderOutcome> = match self.batches.lock().get(&batch_id) {
            Some(ops) => ops
                .values()
                .filter(|o| o.is_success() && !o.rolled_back)
                .cloned()
                .collect(),
            None => {
                debug!("rollback_batch({}): no such batch, nothing to undo", batch_id);
                return true;
            }
        };

        let mut all_reversed = true;

        for outcome in to_reverse {
            let mut reversed = false;
            for attempt in 1..=self.config.rollback_max_attempts {
                match self.compensate_once(&outcome).await {
                    Ok(_) => {
                        reversed = true;
                        break;
                    }
                    Err(err) => {
                        warn!(
                            "rollback attempt {}/{} for op {} in batch {} failed: {}",
                            attempt, self.config.rollback_max_attempts, outcome.operation_id, batch_id, err
                        );
                        if attempt < self.config.rollback_max_attempts {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    }
                }
            }

            if reversed {
                if let Some(ops) = self.batches.lock().get_mut(&batch_id) {
                    if let Some(entry) = ops.get_mut(&outcome.operation_id) {
                        entry.rolled_back = true;
                    }
                }
            } else {
                all_reversed = false;
            }
        }

        if all_reversed {
            info!("rollback_batch({}): fully reversed", batch_id);
        } else {
            warn!("rollback_batch({}): one or more operations could not be reversed", batch_id);
        }

        all_reversed
    }
}
