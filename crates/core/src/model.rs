//! Row types of the sales schema.
//!
//! `Customer` and `Track` are reference data and are never mutated by the
//! simulator. `Invoice` and `InvoiceLine` are created, re-totalled and deleted.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::{CustomerId, InvoiceId, InvoiceLineId, TrackId};
use crate::money::Money;

/// Billing address fields, copied from the customer when an invoice is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub address: BillingAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub unit_price: Money,
}

/// Invoice header.
///
/// Invariant (outside of an open unit of work): `total` equals the sum of
/// `unit_price * quantity` over the invoice's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub invoice_date: NaiveDateTime,
    pub billing: BillingAddress,
    pub total: Money,
}

impl Invoice {
    /// A new invoice for `customer`, with the billing snapshot taken now and
    /// a placeholder total of zero.
    pub fn open_for(id: InvoiceId, customer: &Customer, invoice_date: NaiveDateTime) -> Self {
        Self {
            id,
            customer_id: customer.id,
            invoice_date,
            billing: customer.address.clone(),
            total: Money::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: InvoiceLineId,
    pub invoice_id: InvoiceId,
    pub track_id: TrackId,
    /// Price copied from the track at insertion time.
    pub unit_price: Money,
    pub quantity: i32,
}

impl InvoiceLine {
    /// One unit of `track` on `invoice_id`.
    pub fn single(id: InvoiceLineId, invoice_id: InvoiceId, track: &Track) -> Self {
        Self {
            id,
            invoice_id,
            track_id: track.id,
            unit_price: track.unit_price,
            quantity: 1,
        }
    }

    pub fn amount(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> CustomerId {
        self.id
    }
}

impl Entity for Track {
    type Id = TrackId;

    fn id(&self) -> TrackId {
        self.id
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> InvoiceId {
        self.id
    }
}

impl Entity for InvoiceLine {
    type Id = InvoiceLineId;

    fn id(&self) -> InvoiceLineId {
        self.id
    }
}

/// Inclusive range of (naive) invoice timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Self {
        Self { from, to }
    }

    /// `[reference - days, reference]`.
    pub fn lookback(reference: NaiveDateTime, days: u32) -> Self {
        Self {
            from: reference - TimeDelta::days(i64::from(days)),
            to: reference,
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.from <= at && at <= self.to
    }
}

/// Verification projection of one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAudit {
    pub invoice_id: InvoiceId,
    pub invoice_date: NaiveDateTime,
    pub stored_total: Money,
    /// Sum of `unit_price * quantity` over the invoice's lines.
    pub line_total: Money,
    pub line_count: u64,
    pub distinct_tracks: u64,
}

impl InvoiceAudit {
    pub fn total_matches(&self) -> bool {
        self.stored_total == self.line_total
    }

    pub fn has_duplicate_tracks(&self) -> bool {
        self.distinct_tracks < self.line_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn new_invoice_snapshots_billing_address_with_zero_total() {
        let customer = Customer {
            id: CustomerId::new(7),
            address: BillingAddress {
                address: Some("Rua Dr. Falcão Filho, 155".to_string()),
                city: Some("São Paulo".to_string()),
                state: Some("SP".to_string()),
                country: Some("Brazil".to_string()),
                postal_code: Some("01007-010".to_string()),
            },
        };

        let invoice = Invoice::open_for(InvoiceId::new(500), &customer, at(2, 10, 0, 0));
        assert_eq!(invoice.customer_id, customer.id);
        assert_eq!(invoice.billing, customer.address);
        assert_eq!(invoice.total, Money::ZERO);
    }

    #[test]
    fn single_line_copies_track_price() {
        let track = Track {
            id: TrackId::new(12),
            unit_price: Money::from_cents(199),
        };
        let line = InvoiceLine::single(InvoiceLineId::new(1), InvoiceId::new(2), &track);
        assert_eq!(line.quantity, 1);
        assert_eq!(line.unit_price, track.unit_price);
        assert_eq!(line.amount(), Money::from_cents(199));
    }

    #[test]
    fn lookback_window_is_inclusive() {
        let reference = at(31, 0, 0, 0);
        let window = TimeWindow::lookback(reference, 30);
        assert_eq!(window.from, at(1, 0, 0, 0));
        assert!(window.contains(at(1, 0, 0, 0)));
        assert!(window.contains(reference));
        assert!(!window.contains(at(31, 0, 0, 1)));
    }

    #[test]
    fn audit_flags_duplicates_and_drift() {
        let audit = InvoiceAudit {
            invoice_id: InvoiceId::new(1),
            invoice_date: at(1, 12, 0, 0),
            stored_total: Money::from_cents(198),
            line_total: Money::from_cents(297),
            line_count: 3,
            distinct_tracks: 2,
        };
        assert!(!audit.total_matches());
        assert!(audit.has_duplicate_tracks());
    }
}
