//! Integration tests for the storage boundary.
//!
//! Verifies:
//! - Concurrent units of work never receive the same sequence value
//! - A full create / re-total / cancel round trip keeps the tables consistent
//! - Dropping an open transaction leaves committed state untouched

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;
    use salesim_core::{
        BillingAddress, Customer, CustomerId, Invoice, InvoiceId, InvoiceLine, InvoiceLineId, Money,
        TimeWindow, Track, TrackId,
    };

    use crate::store::in_memory::SalesTables;
    use crate::store::{InMemorySalesStore, SalesStore, Sequence};

    fn store_with_catalog(tracks: i32) -> InMemorySalesStore {
        let mut tables = SalesTables::new();
        tables.insert_customer(Customer {
            id: CustomerId::new(1),
            address: BillingAddress {
                city: Some("Oslo".to_string()),
                country: Some("Norway".to_string()),
                ..BillingAddress::default()
            },
        });
        for id in 1..=tracks {
            tables.insert_track(Track {
                id: TrackId::new(id),
                unit_price: Money::from_cents(99),
            });
        }
        InMemorySalesStore::new(tables)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_are_unique() {
        let store = store_with_catalog(1);
        store.ensure_sequences().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                let mut values = Vec::new();
                for _ in 0..50 {
                    values.push(tx.next_value(Sequence::InvoiceLine).await.unwrap());
                }
                tx.rollback().await.unwrap();
                values
            }));
        }

        let mut all = BTreeSet::new();
        for handle in handles {
            for value in handle.await.unwrap() {
                assert!(all.insert(value), "duplicate sequence value {value}");
            }
        }
        assert_eq!(all.len(), 400);
        assert_eq!(store.peek_sequence(Sequence::InvoiceLine).unwrap(), Some(401));
    }

    #[tokio::test]
    async fn invoice_round_trip_keeps_tables_consistent() {
        let store = store_with_catalog(3);
        store.ensure_sequences().await.unwrap();
        let at = NaiveDate::from_ymd_opt(2026, 4, 2).unwrap().and_hms_opt(15, 4, 5).unwrap();

        let mut tx = store.begin().await.unwrap();
        let customer = tx.customer_at(0).await.unwrap().unwrap();
        let invoice_id = InvoiceId::try_from_sequence(tx.next_value(Sequence::Invoice).await.unwrap()).unwrap();
        tx.insert_invoice(&Invoice::open_for(invoice_id, &customer, at)).await.unwrap();

        for offset in 0..2 {
            let track = tx.track_at_excluding(&BTreeSet::new(), offset).await.unwrap().unwrap();
            let line_id =
                InvoiceLineId::try_from_sequence(tx.next_value(Sequence::InvoiceLine).await.unwrap()).unwrap();
            tx.insert_invoice_line(&InvoiceLine::single(line_id, invoice_id, &track))
                .await
                .unwrap();
        }
        assert_eq!(tx.recompute_invoice_total(invoice_id).await.unwrap(), Money::from_cents(198));
        tx.commit().await.unwrap();

        let tables = store.snapshot().unwrap();
        let invoice = tables.invoice(invoice_id).unwrap();
        assert_eq!(invoice.billing.city.as_deref(), Some("Oslo"));
        assert_eq!(invoice.total, tables.line_total(invoice_id));

        let mut tx = store.begin().await.unwrap();
        let window = TimeWindow::new(at, at);
        assert_eq!(tx.count_invoices_in(window, Money::ZERO).await.unwrap(), 1);
        assert_eq!(tx.delete_invoice_lines(invoice_id).await.unwrap(), 2);
        assert_eq!(tx.delete_invoice(invoice_id).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let tables = store.snapshot().unwrap();
        assert!(tables.invoices.is_empty());
        assert!(tables.lines.is_empty());
    }

    #[tokio::test]
    async fn dropped_transaction_changes_nothing() {
        let store = store_with_catalog(2);
        let before = store.snapshot().unwrap();
        {
            let mut tx = store.begin().await.unwrap();
            let track = tx.track_at_excluding(&BTreeSet::new(), 0).await.unwrap().unwrap();
            assert_eq!(track.id, TrackId::new(1));
            let customer = tx.customer_at(0).await.unwrap().unwrap();
            let at = NaiveDate::from_ymd_opt(2026, 4, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
            tx.insert_invoice(&Invoice::open_for(InvoiceId::new(1), &customer, at))
                .await
                .unwrap();
        }
        assert_eq!(store.snapshot().unwrap(), before);
    }
}
