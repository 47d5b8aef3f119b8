//! The broker and market contracts (spec §4.2, §6). `Broker` is the
//! contract the rebalancing engine drives; `Market` is the narrower,
//! opaque interface the broker itself consumes to resolve prices.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::ApiError;
use crate::order::{BatchId, OperationId, OrderOutcome};
use crate::symbol::Symbol;

#[async_trait]
pub trait Market: Send + Sync {
    /// Current price of `symbol`, if the market carries it.
    async fn price_of(&self, symbol: &Symbol) -> Option<Decimal>;

    /// Whether the market carries `symbol` at all.
    async fn has(&self, symbol: &Symbol) -> bool;
}

/// Four order primitives plus batch rollback. Every primitive is a
/// suspension point (spec §5); every outcome — success or failure — is
/// recorded in the batch table under `batch_id`, when one is supplied.
///
/// `operation_id` lets a caller re-issue the exact same logical operation
/// (e.g. after a transient error on its side) and get back the previously
/// recorded outcome instead of a duplicate fill — spec §4.2's idempotency
/// clause. Passing `None` has the broker mint a fresh one.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn buy_by_amount(
        &self,
        symbol: &Symbol,
        cash_amount: Decimal,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError>;

    async fn buy_by_quantity(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError>;

    async fn sell_by_amount(
        &self,
        symbol: &Symbol,
        cash_amount: Decimal,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError>;

    async fn sell_by_quantity(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        batch_id: Option<BatchId>,
        operation_id: Option<OperationId>,
    ) -> Result<OrderOutcome, ApiError>;

    /// Reverses every successful, not-yet-rolled-back operation in
    /// `batch_id` via quantity-based compensating trades. Returns `true`
    /// iff every such operation was reversed (or the batch didn't exist).
    async fn rollback_batch(&self, batch_id: BatchId) -> bool;
}
