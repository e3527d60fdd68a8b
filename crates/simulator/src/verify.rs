//! Post-run consistency report for one simulated day.

use chrono::NaiveDate;
use serde::Serialize;

use salesim_core::{InvoiceAudit, InvoiceId, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TotalMismatch {
    pub invoice_id: InvoiceId,
    pub stored: Money,
    pub computed: Money,
}

/// What the sales tables look like for `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub date: NaiveDate,
    pub invoice_count: usize,
    pub multi_line_invoices: usize,
    pub revenue: Money,
    pub mismatched_totals: Vec<TotalMismatch>,
    pub duplicate_track_invoices: Vec<InvoiceId>,
}

impl VerificationReport {
    pub fn from_audits(date: NaiveDate, audits: &[InvoiceAudit]) -> Self {
        Self {
            date,
            invoice_count: audits.len(),
            multi_line_invoices: audits.iter().filter(|a| a.line_count > 1).count(),
            revenue: audits.iter().map(|a| a.stored_total).sum(),
            mismatched_totals: audits
                .iter()
                .filter(|a| !a.total_matches())
                .map(|a| TotalMismatch {
                    invoice_id: a.invoice_id,
                    stored: a.stored_total,
                    computed: a.line_total,
                })
                .collect(),
            duplicate_track_invoices: audits
                .iter()
                .filter(|a| a.has_duplicate_tracks())
                .map(|a| a.invoice_id)
                .collect(),
        }
    }

    /// Every total equals its line sum and no invoice repeats a track.
    pub fn is_consistent(&self) -> bool {
        self.mismatched_totals.is_empty() && self.duplicate_track_invoices.is_empty()
    }

    pub fn matches_expected_creates(&self, expected: usize) -> bool {
        self.invoice_count == expected
    }
}
