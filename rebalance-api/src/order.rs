//! Order requests, their outcomes, and the batch identity that binds a
//! group of them into an atomicity boundary (spec §3 "Order Request",
//! "Order Outcome", "Batch").

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that exactly undoes a fill on this side (spec §4.3's
    /// compensating-inverse rule: a buy becomes a sell and vice versa).
    pub fn inverse(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// What the caller asked the broker to do: either an amount- or a
/// quantity-denominated buy or sell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub operation_id: OperationId,
    pub symbol: Symbol,
    pub side: Side,
    pub denomination: Denomination,
    pub batch_id: Option<BatchId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Denomination {
    Amount(Decimal),
    Quantity(Decimal),
}

impl OrderRequest {
    pub fn buy_by_amount(symbol: Symbol, amount: Decimal, batch_id: Option<BatchId>) -> Self {
        Self {
            operation_id: OperationId::new(),
            symbol,
            side: Side::Buy,
            denomination: Denomination::Amount(amount),
            batch_id,
        }
    }

    pub fn sell_by_amount(symbol: Symbol, amount: Decimal, batch_id: Option<BatchId>) -> Self {
        Self {
            operation_id: OperationId::new(),
            symbol,
            side: Side::Sell,
            denomination: Denomination::Amount(amount),
            batch_id,
        }
    }

    pub fn buy_by_quantity(symbol: Symbol, quantity: Decimal, batch_id: Option<BatchId>) -> Self {
        Self {
            operation_id: OperationId::new(),
            symbol,
            side: Side::Buy,
            denomination: Denomination::Quantity(quantity),
            batch_id,
        }
    }

    pub fn sell_by_quantity(symbol: Symbol, quantity: Decimal, batch_id: Option<BatchId>) -> Self {
        Self {
            operation_id: OperationId::new(),
            symbol,
            side: Side::Sell,
            denomination: Denomination::Quantity(quantity),
            batch_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Success,
    Error,
    RolledBack,
}

/// Records the realized side effect of an [`OrderRequest`]: its outcome
/// lives here, not on the request (spec §3 "Order Outcome").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub operation_id: OperationId,
    pub batch_id: Option<BatchId>,
    pub symbol: Symbol,
    pub side: Side,
    pub status: OrderStatus,
    pub execution_price: Decimal,
    pub realized_quantity: Decimal,
    pub error: Option<String>,
    pub rolled_back: bool,
}

impl OrderOutcome {
    pub fn success(
        request: &OrderRequest,
        execution_price: Decimal,
        realized_quantity: Decimal,
    ) -> Self {
        Self {
            operation_id: request.operation_id,
            batch_id: request.batch_id,
            symbol: request.symbol.clone(),
            side: request.side,
            status: OrderStatus::Success,
            execution_price,
            realized_quantity,
            error: None,
            rolled_back: false,
        }
    }

    pub fn failure(request: &OrderRequest, error: impl Into<String>) -> Self {
        Self {
            operation_id: request.operation_id,
            batch_id: request.batch_id,
            symbol: request.symbol.clone(),
            side: request.side,
            status: OrderStatus::Error,
            execution_price: Decimal::ZERO,
            realized_quantity: Decimal::ZERO,
            error: Some(error.into()),
            rolled_back: false,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OrderStatus::Success)
    }
}
