//! Batch request and result types.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use salesim_core::{CustomerId, DomainError, DomainResult, InvoiceId, Money};

/// A validated request for one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchRequest {
    pub target_date: NaiveDate,
    pub creates: u32,
    pub updates: u32,
    pub deletes: u32,
}

impl BatchRequest {
    /// Counts arrive signed from the outside world; negative ones are rejected
    /// here, before anything touches storage.
    pub fn new(target_date: NaiveDate, creates: i64, updates: i64, deletes: i64) -> DomainResult<Self> {
        Ok(Self {
            target_date,
            creates: operation_count("creates", creates)?,
            updates: operation_count("updates", updates)?,
            deletes: operation_count("deletes", deletes)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.creates == 0 && self.updates == 0 && self.deletes == 0
    }
}

fn operation_count(name: &str, value: i64) -> DomainResult<u32> {
    if value < 0 {
        return Err(DomainError::validation(format!("{name} must not be negative (got {value})")));
    }
    u32::try_from(value).map_err(|_| DomainError::validation(format!("{name} is too large (got {value})")))
}

/// Why an augment or cancel did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No invoice in the lookback window with a total above the minimum.
    NoQualifyingInvoice,
    /// The chosen invoice already carries every track.
    CatalogExhausted,
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            SkipReason::NoQualifyingInvoice => "no qualifying invoice",
            SkipReason::CatalogExhausted => "track catalog exhausted",
        })
    }
}

/// Terminal state of an augment or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome<T> {
    Committed(T),
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }

    pub fn committed(&self) -> Option<&T> {
        match self {
            Outcome::Committed(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }
}

/// A sale produced by create-sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreatedSale {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub invoice_date: NaiveDateTime,
    pub total: Money,
    pub line_count: usize,
}

/// Everything one committed batch did, in execution order per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub target_date: NaiveDate,
    pub created: Vec<CreatedSale>,
    pub updated: Vec<Outcome<InvoiceId>>,
    pub deleted: Vec<Outcome<InvoiceId>>,
}

impl BatchResult {
    pub fn new(target_date: NaiveDate) -> Self {
        Self {
            target_date,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Sum of the totals of the invoices created by this batch.
    pub fn revenue(&self) -> Money {
        self.created.iter().map(|sale| sale.total).sum()
    }

    pub fn summary(&self) -> BatchSummary {
        let revenue = self.revenue();
        BatchSummary {
            created: self.created.len(),
            updated: committed(&self.updated),
            updates_skipped: self.updated.len() - committed(&self.updated),
            deleted: committed(&self.deleted),
            deletes_skipped: self.deleted.len() - committed(&self.deleted),
            revenue,
            average_sale: Money::mean(revenue, self.created.len()),
        }
    }
}

fn committed<T>(outcomes: &[Outcome<T>]) -> usize {
    outcomes.iter().filter(|o| o.is_committed()).count()
}

/// Counts and revenue of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub updates_skipped: usize,
    pub deleted: usize,
    pub deletes_skipped: usize,
    pub revenue: Money,
    /// `None` when the batch created nothing.
    pub average_sale: Option<Money>,
}

impl core::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "created {} (revenue {}, average {}), updated {} (skipped {}), deleted {} (skipped {})",
            self.created,
            self.revenue,
            self.average_sale.unwrap_or(Money::ZERO),
            self.updated,
            self.updates_skipped,
            self.deleted,
            self.deletes_skipped,
        )
    }
}
