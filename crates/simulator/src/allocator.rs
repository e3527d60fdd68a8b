//! Invoice and invoice-line id allocation.
//!
//! Ids come from the two storage-owned sequences, never from an in-process
//! counter, so concurrent simulator instances cannot collide. Values consumed
//! by an aborted batch are not returned; gaps are expected.

use serde::Serialize;
use tracing::{info, instrument};

use salesim_core::{InvoiceId, InvoiceLineId};
use salesim_infra::{SalesStore, SalesTx, Sequence};

use crate::error::SimError;

/// Next values of both sequences right after a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceState {
    pub next_invoice_id: i64,
    pub next_invoice_line_id: i64,
}

pub async fn next_invoice_id(tx: &mut dyn SalesTx) -> Result<InvoiceId, SimError> {
    let value = tx.next_value(Sequence::Invoice).await?;
    Ok(InvoiceId::try_from_sequence(value)?)
}

pub async fn next_invoice_line_id(tx: &mut dyn SalesTx) -> Result<InvoiceLineId, SimError> {
    let value = tx.next_value(Sequence::InvoiceLine).await?;
    Ok(InvoiceLineId::try_from_sequence(value)?)
}

/// Create the sequences if needed and point each one past the highest
/// existing id of its table. Idempotent.
#[instrument(skip(store), err)]
pub async fn resync<S>(store: &S) -> Result<SequenceState, SimError>
where
    S: SalesStore + ?Sized,
{
    store.ensure_sequences().await?;
    let next_invoice_id = store.resync_sequence(Sequence::Invoice).await?;
    let next_invoice_line_id = store.resync_sequence(Sequence::InvoiceLine).await?;
    info!(next_invoice_id, next_invoice_line_id, "id sequences synchronized");
    Ok(SequenceState {
        next_invoice_id,
        next_invoice_line_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, store_with, sale};
    use salesim_infra::StoreError;

    #[tokio::test]
    async fn resync_points_past_existing_rows() {
        let store = store_with(2, 4, |tables| {
            let (invoice, lines) = sale(41, 1, at(2026, 1, 10, 9), &[(7, 1), (12, 2)]);
            tables.insert_invoice_with_lines(invoice, lines);
        });

        let state = resync(&store).await.unwrap();
        assert_eq!(state.next_invoice_id, 42);
        assert_eq!(state.next_invoice_line_id, 13);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(next_invoice_id(tx.as_mut()).await.unwrap(), InvoiceId::new(42));
        assert_eq!(next_invoice_line_id(tx.as_mut()).await.unwrap(), InvoiceLineId::new(13));
    }

    #[tokio::test]
    async fn resync_is_idempotent() {
        let store = store_with(1, 1, |_| {});
        let first = resync(&store).await.unwrap();
        let second = resync(&store).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.next_invoice_id, 1);
    }

    #[tokio::test]
    async fn allocations_strictly_increase_and_survive_rollback() {
        let store = store_with(1, 1, |_| {});
        resync(&store).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let a = next_invoice_id(tx.as_mut()).await.unwrap();
        let b = next_invoice_id(tx.as_mut()).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let c = next_invoice_id(tx.as_mut()).await.unwrap();
        assert!(a < b && b < c);
        assert_eq!(c, InvoiceId::new(3));
    }

    #[tokio::test]
    async fn allocation_without_setup_reports_missing_schema() {
        let store = store_with(1, 1, |_| {});
        let mut tx = store.begin().await.unwrap();
        let err = next_invoice_id(tx.as_mut()).await.unwrap_err();
        assert!(matches!(err, SimError::Store(StoreError::SchemaMissing(_))));
    }
}
