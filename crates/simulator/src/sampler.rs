//! Uniform random selection of customers, tracks and recent invoices.
//!
//! Every draw is "count the candidates, pick a uniform offset, fetch the
//! candidate at that offset in key order" inside the caller's unit of work.
//! The distribution is uniform over the live candidate set and a seeded RNG
//! reproduces a run exactly.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use tracing::trace;

use salesim_core::{Customer, DomainError, InvoiceId, Money, TimeWindow, Track, TrackId};
use salesim_infra::SalesTx;

use crate::calendar;
use crate::error::SimError;

/// Owns the RNG for one simulator; all randomness in a batch flows through it.
#[derive(Debug)]
pub struct EntitySampler<R> {
    rng: R,
}

impl<R: Rng + Send> EntitySampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    fn offset(&mut self, count: u64) -> Option<u64> {
        (count > 0).then(|| self.rng.random_range(0..count))
    }

    /// Any customer. Fails with `NotFound` when there are none.
    pub async fn random_customer(&mut self, tx: &mut dyn SalesTx) -> Result<Customer, SimError> {
        let count = tx.count_customers().await?;
        let offset = self
            .offset(count)
            .ok_or_else(|| DomainError::not_found("no customers to bill"))?;
        let customer = tx
            .customer_at(offset)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("customer at offset {offset}")))?;
        trace!(customer_id = %customer.id, "sampled customer");
        Ok(customer)
    }

    /// A track not in `excluded` (the tracks already on `invoice`), or `None`
    /// once the catalog is exhausted for that invoice.
    pub async fn random_unused_track(
        &mut self,
        tx: &mut dyn SalesTx,
        invoice: InvoiceId,
        excluded: &BTreeSet<TrackId>,
    ) -> Result<Option<Track>, SimError> {
        let count = tx.count_tracks_excluding(excluded).await?;
        let Some(offset) = self.offset(count) else {
            trace!(invoice_id = %invoice, excluded = excluded.len(), "track catalog exhausted");
            return Ok(None);
        };
        Ok(tx.track_at_excluding(excluded, offset).await?)
    }

    /// An invoice dated in `[reference - window_days, reference]` with a
    /// total strictly above `min_total`, or `None` when nothing qualifies.
    pub async fn random_recent_invoice(
        &mut self,
        tx: &mut dyn SalesTx,
        reference: NaiveDateTime,
        window_days: u32,
        min_total: Money,
    ) -> Result<Option<InvoiceId>, SimError> {
        let window = TimeWindow::lookback(reference, window_days);
        let count = tx.count_invoices_in(window, min_total).await?;
        let Some(offset) = self.offset(count) else {
            return Ok(None);
        };
        Ok(tx.invoice_in_at(window, min_total, offset).await?)
    }

    /// Number of lines for a new sale, uniform over `1..=max_items`.
    pub fn item_count(&mut self, max_items: u32) -> u32 {
        self.rng.random_range(1..=max_items.max(1))
    }

    /// `n` independent instants within `date`, in chronological order.
    pub fn timestamps(&mut self, date: NaiveDate, n: u32) -> Vec<NaiveDateTime> {
        let mut stamps: Vec<NaiveDateTime> = (0..n)
            .map(|_| calendar::random_timestamp(date, &mut self.rng))
            .collect();
        stamps.sort_unstable();
        stamps
    }
}
