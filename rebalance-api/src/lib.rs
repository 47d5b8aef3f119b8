//! Shared foundation for the portfolio rebalancing core: fixed-point
//! decimal scales, validated symbols and stocks, the broker/market
//! contracts, order/batch types, the error taxonomy, and process-wide
//! configuration.

pub mod broker;
pub mod config;
pub mod decimal;
pub mod error;
pub mod order;
pub mod stock;
pub mod symbol;

pub use broker::{Broker, Market};
pub use config::EngineConfig;
pub use error::ApiError;
pub use order::{BatchId, Denomination, OperationId, OrderOutcome, OrderRequest, OrderStatus, Side};
pub use stock::{PriceChange, Stock};
pub use symbol::Symbol;
