//! The three sale operations.
//!
//! Each runs inside the caller's unit of work and ends either committed to
//! that unit of work or skipped. Nothing here commits or rolls back.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use rand::Rng;
use tracing::{debug, instrument};

use salesim_core::{DomainError, Invoice, InvoiceId, InvoiceLine, Money};
use salesim_infra::SalesTx;

use crate::allocator;
use crate::batch::{CreatedSale, Outcome, SkipReason};
use crate::error::SimError;
use crate::sampler::EntitySampler;

/// Where augment and cancel look for their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetWindow {
    pub reference: NaiveDateTime,
    pub window_days: u32,
    pub min_total: Money,
}

/// Create one invoice at `invoice_date` for a random customer with up to
/// `max_items` distinct tracks.
///
/// The invoice is inserted with a zero total first and finalized once all
/// lines are in. If the catalog runs out the sale simply has fewer lines.
#[instrument(skip(tx, sampler), fields(invoice_id), err)]
pub async fn create_sale<R: Rng + Send>(
    tx: &mut dyn SalesTx,
    sampler: &mut EntitySampler<R>,
    invoice_date: NaiveDateTime,
    max_items: u32,
) -> Result<CreatedSale, SimError> {
    let customer = sampler.random_customer(tx).await?;
    let invoice_id = allocator::next_invoice_id(tx).await?;
    tracing::Span::current().record("invoice_id", tracing::field::display(invoice_id));
    tx.insert_invoice(&Invoice::open_for(invoice_id, &customer, invoice_date))
        .await?;

    let wanted = sampler.item_count(max_items) as usize;
    let mut used = BTreeSet::new();
    let mut total = Money::ZERO;
    while used.len() < wanted {
        let Some(track) = sampler.random_unused_track(tx, invoice_id, &used).await? else {
            debug!(lines = used.len(), wanted, "catalog exhausted, finishing sale early");
            break;
        };
        let line = InvoiceLine::single(allocator::next_invoice_line_id(tx).await?, invoice_id, &track);
        tx.insert_invoice_line(&line).await?;
        total += line.amount();
        used.insert(track.id);
    }

    tx.update_invoice_total(invoice_id, total).await?;
    Ok(CreatedSale {
        invoice_id,
        customer_id: customer.id,
        invoice_date,
        total,
        line_count: used.len(),
    })
}

/// Add one track the invoice does not carry yet to a random recent invoice,
/// then recompute its total from all of its lines.
#[instrument(skip(tx, sampler), err)]
pub async fn augment_sale<R: Rng + Send>(
    tx: &mut dyn SalesTx,
    sampler: &mut EntitySampler<R>,
    target: TargetWindow,
) -> Result<Outcome<InvoiceId>, SimError> {
    let Some(invoice_id) = sampler
        .random_recent_invoice(tx, target.reference, target.window_days, target.min_total)
        .await?
    else {
        return Ok(Outcome::Skipped(SkipReason::NoQualifyingInvoice));
    };

    let used = tx.invoice_track_ids(invoice_id).await?;
    let Some(track) = sampler.random_unused_track(tx, invoice_id, &used).await? else {
        return Ok(Outcome::Skipped(SkipReason::CatalogExhausted));
    };

    let line = InvoiceLine::single(allocator::next_invoice_line_id(tx).await?, invoice_id, &track);
    tx.insert_invoice_line(&line).await?;
    let total = tx.recompute_invoice_total(invoice_id).await?;
    debug!(%invoice_id, track_id = %track.id, %total, "sale augmented");
    Ok(Outcome::Committed(invoice_id))
}

/// Delete a random recent invoice: its lines first, then the invoice row.
#[instrument(skip(tx, sampler), err)]
pub async fn cancel_sale<R: Rng + Send>(
    tx: &mut dyn SalesTx,
    sampler: &mut EntitySampler<R>,
    target: TargetWindow,
) -> Result<Outcome<InvoiceId>, SimError> {
    let Some(invoice_id) = sampler
        .random_recent_invoice(tx, target.reference, target.window_days, target.min_total)
        .await?
    else {
        return Ok(Outcome::Skipped(SkipReason::NoQualifyingInvoice));
    };

    let lines = tx.delete_invoice_lines(invoice_id).await?;
    if tx.delete_invoice(invoice_id).await? != 1 {
        return Err(DomainError::invariant(format!("invoice {invoice_id} vanished while being cancelled")).into());
    }
    debug!(%invoice_id, lines, "sale cancelled");
    Ok(Outcome::Committed(invoice_id))
}
