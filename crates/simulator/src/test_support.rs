//! Fixtures shared by the unit tests.

use chrono::{NaiveDate, NaiveDateTime};

use salesim_core::{
    BillingAddress, Customer, CustomerId, Invoice, InvoiceId, InvoiceLine, InvoiceLineId, Money,
    Track, TrackId,
};
use salesim_infra::InMemorySalesStore;
use salesim_infra::store::in_memory::SalesTables;

pub const TRACK_PRICE_CENTS: i64 = 99;

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

/// `customers` customers and `tracks` tracks priced 0.99 (track 1..=n),
/// plus whatever `seed` adds.
pub fn tables_with(customers: i32, tracks: i32, seed: impl FnOnce(&mut SalesTables)) -> SalesTables {
    let mut tables = SalesTables::new();
    for id in 1..=customers {
        tables.insert_customer(Customer {
            id: CustomerId::new(id),
            address: BillingAddress {
                address: Some(format!("{id} Main Street")),
                city: Some("Lisbon".to_string()),
                country: Some("Portugal".to_string()),
                ..BillingAddress::default()
            },
        });
    }
    for id in 1..=tracks {
        tables.insert_track(Track {
            id: TrackId::new(id),
            unit_price: Money::from_cents(TRACK_PRICE_CENTS),
        });
    }
    seed(&mut tables);
    tables
}

pub fn store_with(customers: i32, tracks: i32, seed: impl FnOnce(&mut SalesTables)) -> InMemorySalesStore {
    InMemorySalesStore::new(tables_with(customers, tracks, seed))
}

/// A consistent invoice for customer `customer` with `(line_id, track_id)` lines.
pub fn sale(
    invoice_id: i32,
    customer: i32,
    invoice_date: NaiveDateTime,
    lines: &[(i32, i32)],
) -> (Invoice, Vec<InvoiceLine>) {
    let id = InvoiceId::new(invoice_id);
    let lines: Vec<InvoiceLine> = lines
        .iter()
        .map(|&(line_id, track_id)| {
            InvoiceLine::single(
                InvoiceLineId::new(line_id),
                id,
                &Track {
                    id: TrackId::new(track_id),
                    unit_price: Money::from_cents(TRACK_PRICE_CENTS),
                },
            )
        })
        .collect();
    let invoice = Invoice {
        id,
        customer_id: CustomerId::new(customer),
        invoice_date,
        billing: BillingAddress::default(),
        total: lines.iter().map(InvoiceLine::amount).sum(),
    };
    (invoice, lines)
}
