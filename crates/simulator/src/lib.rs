//! Batch simulation engine for D-1 sales activity.
//!
//! Given a target day and a requested mix of operations, the [`Simulator`]
//! cancels, augments and creates invoices against an existing sales schema,
//! all inside one unit of work:
//!
//! - [`allocator`]: invoice / invoice-line ids from the storage sequences
//! - [`sampler`]: uniform random customers, unused tracks and recent invoices
//! - [`operations`]: create-sale, augment-sale, cancel-sale
//! - [`orchestrator`]: ordering, atomicity and outcome aggregation
//! - [`verify`]: read-only consistency report for a simulated day

pub mod allocator;
pub mod batch;
pub mod calendar;
pub mod config;
pub mod error;
pub mod operations;
pub mod orchestrator;
pub mod sampler;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

pub use allocator::SequenceState;
pub use batch::{BatchRequest, BatchResult, BatchSummary, CreatedSale, Outcome, SkipReason};
pub use config::SimulatorConfig;
pub use error::SimError;
pub use orchestrator::Simulator;
pub use sampler::EntitySampler;
pub use verify::{TotalMismatch, VerificationReport};
