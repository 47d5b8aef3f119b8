//! The Atomic Batch Broker: an in-memory, batch-tracked `Broker`
//! implementation with compensating rollback, plus the minimal `Market`
//! it needs to resolve prices.

pub mod broker;
pub mod market;

pub use broker::AtomicBatchBroker;
pub use market::InMemoryMarket;
