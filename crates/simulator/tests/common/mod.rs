#![allow(dead_code)]

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};

use salesim_core::{
    BillingAddress, Customer, CustomerId, Invoice, InvoiceId, InvoiceLine, InvoiceLineId, Money,
    Track, TrackId,
};
use salesim_infra::InMemorySalesStore;
use salesim_infra::store::in_memory::SalesTables;
use salesim_simulator::{Simulator, SimulatorConfig};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(day: NaiveDate, h: u32, min: u32) -> NaiveDateTime {
    day.and_hms_opt(h, min, 0).unwrap()
}

/// Customers 1..=customers and tracks 1..=prices.len() with the given prices.
pub fn catalog(customers: i32, prices: &[i64]) -> SalesTables {
    let mut tables = SalesTables::new();
    for id in 1..=customers {
        tables.insert_customer(Customer {
            id: CustomerId::new(id),
            address: BillingAddress {
                city: Some(format!("City {id}")),
                country: Some("Canada".to_string()),
                ..BillingAddress::default()
            },
        });
    }
    for (id, &cents) in (1..).zip(prices) {
        tables.insert_track(Track {
            id: TrackId::new(id),
            unit_price: Money::from_cents(cents),
        });
    }
    tables
}

/// Seed a consistent invoice whose lines use `tracks`, with line ids
/// continuing after the highest existing line id.
pub fn seed_invoice(tables: &mut SalesTables, id: i32, customer: i32, when: NaiveDateTime, tracks: &[i32]) {
    let invoice_id = InvoiceId::new(id);
    let mut next_line = tables.lines.keys().next_back().map_or(1, |l| l.get() + 1);
    let mut lines = Vec::new();
    for &track_id in tracks {
        let track = tables.tracks[&TrackId::new(track_id)];
        lines.push(InvoiceLine::single(InvoiceLineId::new(next_line), invoice_id, &track));
        next_line += 1;
    }
    let invoice = Invoice {
        id: invoice_id,
        customer_id: CustomerId::new(customer),
        invoice_date: when,
        billing: BillingAddress::default(),
        total: lines.iter().map(InvoiceLine::amount).sum(),
    };
    tables.insert_invoice_with_lines(invoice, lines);
}

pub async fn ready_simulator(store: &InMemorySalesStore, seed: u64) -> Simulator<InMemorySalesStore> {
    let config = SimulatorConfig {
        seed: Some(seed),
        ..SimulatorConfig::default()
    };
    let sim = Simulator::from_config(store.clone(), config).unwrap();
    sim.setup().await.unwrap();
    sim
}

/// Panics unless every invoice's total equals its line sum and no invoice
/// carries the same track twice.
pub fn assert_tables_consistent(tables: &SalesTables) {
    for invoice in tables.invoices.values() {
        assert_eq!(
            invoice.total,
            tables.line_total(invoice.id),
            "invoice {} total drifted from its lines",
            invoice.id
        );
        let lines: Vec<_> = tables.lines_of(invoice.id).collect();
        let tracks: BTreeSet<TrackId> = lines.iter().map(|l| l.track_id).collect();
        assert_eq!(tracks.len(), lines.len(), "invoice {} repeats a track", invoice.id);
    }
    for line in tables.lines.values() {
        assert!(tables.invoices.contains_key(&line.invoice_id), "orphan line {}", line.id);
    }
}
