//! Portfolio-level error taxonomy (spec §7): construction-time validation
//! failures, and the three ways a mutating operation can end badly.

use rebalance_api::{ApiError, OperationId, Symbol};
use thiserror::Error;

/// One order that failed within a batch, carried by the portfolio errors
/// below so the caller can see exactly what went wrong.
#[derive(Debug, Clone)]
pub struct FailedOperation {
    pub symbol: Symbol,
    pub operation_id: Option<OperationId>,
    pub reason: String,
}

impl FailedOperation {
    pub fn from_api_error(symbol: Symbol, error: &ApiError) -> Self {
        Self {
            symbol,
            operation_id: error.operation_id().map(OperationId),
            reason: error.to_string(),
        }
    }
}

/// Failures validating a [`crate::portfolio::PortfolioConfig`] — these
/// never reach the rebalance engine (spec §7's boundary-failure rule).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("portfolio must hold at least one allocated stock")]
    Empty,

    #[error("duplicate symbol in allocation: {0}")]
    DuplicateSymbol(Symbol),

    #[error("allocation percentages must sum to exactly 1, got {0}")]
    AllocationsDoNotSumToOne(String),

    #[error("allocation percent for {symbol} must be in (0, 1], got {percent}")]
    InvalidAllocationPercent { symbol: Symbol, percent: String },

    #[error("initial investment {0} is outside [MIN_INVESTMENT, MAX_PORTFOLIO_VALUE]")]
    InvestmentOutOfBounds(String),
}

/// Runtime failures of `initialize`/`rebalance` (spec §4.4.1, §4.4.2).
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("one or more opening orders failed; rollback succeeded")]
    PortfolioInitializationFailed { failed_operations: Vec<FailedOperation> },

    #[error("rebalance failed on attempt {attempt}; rollback succeeded")]
    PortfolioRetry {
        failed_operations: Vec<FailedOperation>,
        attempt: u32,
    },

    #[error("portfolio is stale and rejects mutating operations")]
    PortfolioStale { failed_operations: Vec<FailedOperation> },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
