//! Infrastructure layer: the storage boundary of the sales simulator.
//!
//! The simulator only talks to [`store::SalesStore`] / [`store::SalesTx`];
//! this crate provides the Postgres adapter used in production and an
//! in-memory adapter for tests and dry runs.

pub mod config;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, DbConfig};
pub use store::{
    FaultPlan, InMemorySalesStore, PostgresSalesStore, SalesStore, SalesTx, Sequence, StoreError,
};
