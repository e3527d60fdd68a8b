//! Storage boundary for the sales schema.
//!
//! A [`SalesStore`] hands out units of work ([`SalesTx`]). Every read, insert,
//! update and delete the simulator performs goes through one open `SalesTx`;
//! either `commit` makes all of it visible or `rollback` (or dropping the
//! transaction) discards all of it.
//!
//! The two id sequences are the exception: `next_value` is an atomic
//! increment-and-fetch owned by the storage layer and is never undone, so ids
//! may show gaps after an aborted batch.
//!
//! ## Sampling primitives
//!
//! Random selection is split into "count the candidates" and "fetch the
//! candidate at offset `k` in key order". The caller draws `k` uniformly,
//! which keeps the distribution uniform over the live candidate set while
//! letting a seeded RNG reproduce a run.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use salesim_core::{
    Customer, Invoice, InvoiceAudit, InvoiceId, InvoiceLine, Money, TimeWindow, Track, TrackId,
};

pub mod in_memory;
pub mod postgres;

pub use in_memory::{FaultPlan, InMemorySalesStore};
pub use postgres::PostgresSalesStore;

/// One of the two persisted id counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sequence {
    Invoice,
    InvoiceLine,
}

impl Sequence {
    pub const ALL: [Sequence; 2] = [Sequence::Invoice, Sequence::InvoiceLine];

    /// Name of the backing database sequence.
    pub fn name(self) -> &'static str {
        match self {
            Sequence::Invoice => "invoice_id_seq",
            Sequence::InvoiceLine => "invoice_line_id_seq",
        }
    }
}

impl core::fmt::Display for Sequence {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage operation error.
///
/// Every variant is fatal to the unit of work it occurred in.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique violation or serialization failure.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Foreign-key or check constraint violation.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Required schema objects (sequences, tables) are missing; run setup.
    #[error("schema not ready: {0}")]
    SchemaMissing(String),

    /// The backend could not be reached (pool closed, I/O failure).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The transaction was already committed or rolled back.
    #[error("transaction already closed")]
    Closed,

    /// Failure injected by a [`FaultPlan`].
    #[error("injected fault: {0}")]
    Injected(String),

    #[error("storage error: {0}")]
    Backend(String),
}

/// Factory for units of work plus the schema-level maintenance operations.
#[async_trait]
pub trait SalesStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn SalesTx>, StoreError>;

    /// Create both id sequences if they do not exist yet.
    async fn ensure_sequences(&self) -> Result<(), StoreError>;

    /// Reset `seq` so that its next value is `max(existing id) + 1`
    /// (1 for an empty table). Returns that next value.
    async fn resync_sequence(&self, seq: Sequence) -> Result<i64, StoreError>;

    /// Fail with [`StoreError::SchemaMissing`] unless both sequences exist.
    async fn check_schema(&self) -> Result<(), StoreError>;
}

/// An open unit of work against the sales schema.
#[async_trait]
pub trait SalesTx: Send {
    /// Atomically advance `seq` and return the new value. Not undone by rollback.
    async fn next_value(&mut self, seq: Sequence) -> Result<i64, StoreError>;

    async fn count_customers(&mut self) -> Result<u64, StoreError>;

    /// Customer at `offset` in id order.
    async fn customer_at(&mut self, offset: u64) -> Result<Option<Customer>, StoreError>;

    async fn count_tracks_excluding(&mut self, excluded: &BTreeSet<TrackId>) -> Result<u64, StoreError>;

    /// Track at `offset` in id order among tracks not in `excluded`.
    async fn track_at_excluding(
        &mut self,
        excluded: &BTreeSet<TrackId>,
        offset: u64,
    ) -> Result<Option<Track>, StoreError>;

    /// Invoices dated within `window` whose total is strictly above `min_total`.
    async fn count_invoices_in(&mut self, window: TimeWindow, min_total: Money) -> Result<u64, StoreError>;

    async fn invoice_in_at(
        &mut self,
        window: TimeWindow,
        min_total: Money,
        offset: u64,
    ) -> Result<Option<InvoiceId>, StoreError>;

    /// Tracks currently on `invoice`.
    async fn invoice_track_ids(&mut self, invoice: InvoiceId) -> Result<BTreeSet<TrackId>, StoreError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    async fn insert_invoice_line(&mut self, line: &InvoiceLine) -> Result<(), StoreError>;

    async fn update_invoice_total(&mut self, invoice: InvoiceId, total: Money) -> Result<(), StoreError>;

    /// Set the invoice total to the sum over all of its current lines and
    /// return the new total.
    async fn recompute_invoice_total(&mut self, invoice: InvoiceId) -> Result<Money, StoreError>;

    /// Returns the number of deleted lines.
    async fn delete_invoice_lines(&mut self, invoice: InvoiceId) -> Result<u64, StoreError>;

    /// Returns the number of deleted invoices (0 or 1).
    async fn delete_invoice(&mut self, invoice: InvoiceId) -> Result<u64, StoreError>;

    /// Audit rows for every invoice dated within `window`, in id order.
    async fn audit_invoices(&mut self, window: TimeWindow) -> Result<Vec<InvoiceAudit>, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}
