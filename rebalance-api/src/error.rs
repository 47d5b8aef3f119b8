//! Error taxonomy shared by the broker contract and its implementations.
//!
//! Validation errors (`InvalidSymbol`, `InvalidPrice`) fail at the
//! boundary and never propagate into the rebalance engine. Broker
//! primitive errors (`BuyFailed`, `SellFailed`, `StockNotFound`,
//! `BrokerConnectionFailed`) are recorded in the batch table and returned
//! to the caller; the portfolio-level errors that wrap them live in
//! `rebalance-engine`.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::order::{BatchId, OperationId};
use crate::symbol::Symbol;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("invalid price {price}: must be finite and in range")]
    InvalidPrice { price: String },

    #[error("symbol not found in market: {0}")]
    StockNotFound(Symbol),

    #[error("broker connection failed: {reason}")]
    BrokerConnectionFailed { reason: String },

    #[error("buy failed for {symbol} (op {operation_id}): {reason}")]
    BuyFailed {
        symbol: Symbol,
        batch_id: Option<BatchId>,
        operation_id: OperationId,
        reason: String,
    },

    #[error("sell failed for {symbol} (op {operation_id}): {reason}")]
    SellFailed {
        symbol: Symbol,
        batch_id: Option<BatchId>,
        operation_id: OperationId,
        reason: String,
    },
}

impl ApiError {
    pub fn invalid_price(price: Decimal) -> Self {
        ApiError::InvalidPrice {
            price: price.to_string(),
        }
    }

    /// Operation id the failure is attached to, when one exists.
    pub fn operation_id(&self) -> Option<Uuid> {
        match self {
            ApiError::BuyFailed { operation_id, .. } | ApiError::SellFailed { operation_id, .. } => {
                Some(operation_id.0)
            }
            _ => None,
        }
    }

    pub fn batch_id(&self) -> Option<BatchId> {
        match self {
            ApiError::BuyFailed { batch_id, .. } | ApiError::SellFailed { batch_id, .. } => {
                batch_id.clone()
            }
            _ => None,
        }
    }
}
