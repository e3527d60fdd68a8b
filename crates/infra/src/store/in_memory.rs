//! In-memory sales store.
//!
//! Intended for tests and dry runs. Each transaction works on a private copy
//! of the committed tables and publishes it wholesale on commit, so concurrent
//! writers are not merged (last commit wins). Sequences live outside the
//! table snapshot and are never rolled back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use salesim_core::{
    Customer, CustomerId, Entity, Invoice, InvoiceAudit, InvoiceId, InvoiceLine, InvoiceLineId,
    Money, TimeWindow, Track, TrackId,
};

use super::{SalesStore, SalesTx, Sequence, StoreError};

/// Committed contents of the four sales tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalesTables {
    pub customers: BTreeMap<CustomerId, Customer>,
    pub tracks: BTreeMap<TrackId, Track>,
    pub invoices: BTreeMap<InvoiceId, Invoice>,
    pub lines: BTreeMap<InvoiceLineId, InvoiceLine>,
}

impl SalesTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_customer(&mut self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn insert_track(&mut self, track: Track) {
        self.tracks.insert(track.id, track);
    }

    /// Seed a pre-existing invoice with its lines, stored exactly as given.
    pub fn insert_invoice_with_lines(&mut self, invoice: Invoice, lines: Vec<InvoiceLine>) {
        for line in lines {
            self.lines.insert(line.id, line);
        }
        self.invoices.insert(invoice.id, invoice);
    }

    pub fn invoice(&self, id: InvoiceId) -> Option<&Invoice> {
        self.invoices.get(&id)
    }

    pub fn lines_of(&self, invoice: InvoiceId) -> impl Iterator<Item = &InvoiceLine> {
        self.lines.values().filter(move |l| l.invoice_id == invoice)
    }

    pub fn line_total(&self, invoice: InvoiceId) -> Money {
        self.lines_of(invoice).map(InvoiceLine::amount).sum()
    }

    fn invoices_in(&self, window: TimeWindow, min_total: Money) -> impl Iterator<Item = &Invoice> {
        self.invoices
            .values()
            .filter(move |i| window.contains(i.invoice_date) && i.total > min_total)
    }
}

fn insert_unique<E>(table: &mut BTreeMap<E::Id, E>, row: &E, table_name: &str) -> Result<(), StoreError>
where
    E: Entity + Clone,
{
    let id = row.id();
    if table.contains_key(&id) {
        return Err(StoreError::Conflict(format!(
            "duplicate key {id} in {table_name}"
        )));
    }
    table.insert(id, row.clone());
    Ok(())
}

/// Deterministic failure injection for abort-path testing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    fail_invoice_insert_after: Option<usize>,
}

impl FaultPlan {
    pub fn none() -> Self {
        Self::default()
    }

    /// Let `n` invoice inserts per transaction succeed, fail the next one.
    pub fn fail_after_invoice_inserts(n: usize) -> Self {
        Self {
            fail_invoice_insert_after: Some(n),
        }
    }
}

type Sequences = Arc<Mutex<BTreeMap<Sequence, i64>>>;

fn lock_poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory [`SalesStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemorySalesStore {
    tables: Arc<RwLock<SalesTables>>,
    /// Next value per installed sequence. Absent means "not created yet".
    sequences: Sequences,
    faults: FaultPlan,
}

impl InMemorySalesStore {
    pub fn new(tables: SalesTables) -> Self {
        Self {
            tables: Arc::new(RwLock::new(tables)),
            sequences: Arc::new(Mutex::new(BTreeMap::new())),
            faults: FaultPlan::none(),
        }
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Copy of the committed tables.
    pub fn snapshot(&self) -> Result<SalesTables, StoreError> {
        let tables = self.tables.read().map_err(|_| lock_poisoned())?;
        Ok(tables.clone())
    }

    /// The value `next_value(seq)` would hand out next, if the sequence exists.
    pub fn peek_sequence(&self, seq: Sequence) -> Result<Option<i64>, StoreError> {
        let sequences = self.sequences.lock().map_err(|_| lock_poisoned())?;
        Ok(sequences.get(&seq).copied())
    }
}

#[async_trait]
impl SalesStore for InMemorySalesStore {
    async fn begin(&self) -> Result<Box<dyn SalesTx>, StoreError> {
        let working = self.snapshot()?;
        Ok(Box::new(InMemoryTx {
            committed: self.tables.clone(),
            sequences: self.sequences.clone(),
            working: Some(working),
            faults: self.faults,
            invoice_inserts: 0,
        }))
    }

    async fn ensure_sequences(&self) -> Result<(), StoreError> {
        let mut sequences = self.sequences.lock().map_err(|_| lock_poisoned())?;
        for seq in Sequence::ALL {
            sequences.entry(seq).or_insert(1);
        }
        Ok(())
    }

    async fn resync_sequence(&self, seq: Sequence) -> Result<i64, StoreError> {
        let max = {
            let tables = self.tables.read().map_err(|_| lock_poisoned())?;
            match seq {
                Sequence::Invoice => tables.invoices.keys().next_back().map(|id| id.get()),
                Sequence::InvoiceLine => tables.lines.keys().next_back().map(|id| id.get()),
            }
        };
        let next = i64::from(max.unwrap_or(0)) + 1;

        let mut sequences = self.sequences.lock().map_err(|_| lock_poisoned())?;
        match sequences.get_mut(&seq) {
            Some(value) => *value = next,
            None => return Err(StoreError::SchemaMissing(format!("sequence {seq} does not exist"))),
        }
        Ok(next)
    }

    async fn check_schema(&self) -> Result<(), StoreError> {
        let sequences = self.sequences.lock().map_err(|_| lock_poisoned())?;
        let missing: Vec<&str> = Sequence::ALL
            .iter()
            .filter(|seq| !sequences.contains_key(seq))
            .map(|seq| seq.name())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::SchemaMissing(format!(
                "missing sequences: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Unit of work over a private copy of the tables.
#[derive(Debug)]
pub struct InMemoryTx {
    committed: Arc<RwLock<SalesTables>>,
    sequences: Sequences,
    /// `None` once committed or rolled back.
    working: Option<SalesTables>,
    faults: FaultPlan,
    invoice_inserts: usize,
}

impl InMemoryTx {
    fn tables(&mut self) -> Result<&mut SalesTables, StoreError> {
        self.working.as_mut().ok_or(StoreError::Closed)
    }

    fn require_invoice(tables: &SalesTables, invoice: InvoiceId) -> Result<(), StoreError> {
        if tables.invoices.contains_key(&invoice) {
            Ok(())
        } else {
            Err(StoreError::Integrity(format!("invoice {invoice} does not exist")))
        }
    }
}

#[async_trait]
impl SalesTx for InMemoryTx {
    async fn next_value(&mut self, seq: Sequence) -> Result<i64, StoreError> {
        if self.working.is_none() {
            return Err(StoreError::Closed);
        }
        let mut sequences = self.sequences.lock().map_err(|_| lock_poisoned())?;
        let next = sequences
            .get_mut(&seq)
            .ok_or_else(|| StoreError::SchemaMissing(format!("sequence {seq} does not exist")))?;
        let value = *next;
        *next += 1;
        Ok(value)
    }

    async fn count_customers(&mut self) -> Result<u64, StoreError> {
        Ok(self.tables()?.customers.len() as u64)
    }

    async fn customer_at(&mut self, offset: u64) -> Result<Option<Customer>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.customers.values().nth(offset as usize).cloned())
    }

    async fn count_tracks_excluding(&mut self, excluded: &BTreeSet<TrackId>) -> Result<u64, StoreError> {
        let tables = self.tables()?;
        Ok(tables.tracks.keys().filter(|id| !excluded.contains(id)).count() as u64)
    }

    async fn track_at_excluding(
        &mut self,
        excluded: &BTreeSet<TrackId>,
        offset: u64,
    ) -> Result<Option<Track>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .tracks
            .values()
            .filter(|t| !excluded.contains(&t.id))
            .nth(offset as usize)
            .copied())
    }

    async fn count_invoices_in(&mut self, window: TimeWindow, min_total: Money) -> Result<u64, StoreError> {
        let tables = self.tables()?;
        Ok(tables.invoices_in(window, min_total).count() as u64)
    }

    async fn invoice_in_at(
        &mut self,
        window: TimeWindow,
        min_total: Money,
        offset: u64,
    ) -> Result<Option<InvoiceId>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .invoices_in(window, min_total)
            .nth(offset as usize)
            .map(|i| i.id))
    }

    async fn invoice_track_ids(&mut self, invoice: InvoiceId) -> Result<BTreeSet<TrackId>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.lines_of(invoice).map(|l| l.track_id).collect())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        if let Some(limit) = self.faults.fail_invoice_insert_after {
            if self.invoice_inserts >= limit {
                return Err(StoreError::Injected(format!(
                    "invoice insert #{} refused",
                    self.invoice_inserts + 1
                )));
            }
        }

        let tables = self.tables()?;
        if !tables.customers.contains_key(&invoice.customer_id) {
            return Err(StoreError::Integrity(format!(
                "customer {} does not exist",
                invoice.customer_id
            )));
        }
        insert_unique(&mut tables.invoices, invoice, "Invoice")?;
        self.invoice_inserts += 1;
        Ok(())
    }

    async fn insert_invoice_line(&mut self, line: &InvoiceLine) -> Result<(), StoreError> {
        let tables = self.tables()?;
        Self::require_invoice(tables, line.invoice_id)?;
        if !tables.tracks.contains_key(&line.track_id) {
            return Err(StoreError::Integrity(format!(
                "track {} does not exist",
                line.track_id
            )));
        }
        insert_unique(&mut tables.lines, line, "InvoiceLine")
    }

    async fn update_invoice_total(&mut self, invoice: InvoiceId, total: Money) -> Result<(), StoreError> {
        let tables = self.tables()?;
        match tables.invoices.get_mut(&invoice) {
            Some(row) => {
                row.total = total;
                Ok(())
            }
            None => Err(StoreError::Integrity(format!("invoice {invoice} does not exist"))),
        }
    }

    async fn recompute_invoice_total(&mut self, invoice: InvoiceId) -> Result<Money, StoreError> {
        let tables = self.tables()?;
        Self::require_invoice(tables, invoice)?;
        let total = tables.line_total(invoice);
        if let Some(row) = tables.invoices.get_mut(&invoice) {
            row.total = total;
        }
        Ok(total)
    }

    async fn delete_invoice_lines(&mut self, invoice: InvoiceId) -> Result<u64, StoreError> {
        let tables = self.tables()?;
        let before = tables.lines.len();
        tables.lines.retain(|_, l| l.invoice_id != invoice);
        Ok((before - tables.lines.len()) as u64)
    }

    async fn delete_invoice(&mut self, invoice: InvoiceId) -> Result<u64, StoreError> {
        let tables = self.tables()?;
        if tables.lines_of(invoice).next().is_some() {
            return Err(StoreError::Integrity(format!(
                "invoice {invoice} is still referenced by invoice lines"
            )));
        }
        Ok(u64::from(tables.invoices.remove(&invoice).is_some()))
    }

    async fn audit_invoices(&mut self, window: TimeWindow) -> Result<Vec<InvoiceAudit>, StoreError> {
        let tables = self.tables()?;
        let audits = tables
            .invoices
            .values()
            .filter(|i| window.contains(i.invoice_date))
            .map(|invoice| {
                let mut line_count = 0u64;
                let mut tracks = BTreeSet::new();
                for line in tables.lines_of(invoice.id) {
                    line_count += 1;
                    tracks.insert(line.track_id);
                }
                InvoiceAudit {
                    invoice_id: invoice.id,
                    invoice_date: invoice.invoice_date,
                    stored_total: invoice.total,
                    line_total: tables.line_total(invoice.id),
                    line_count,
                    distinct_tracks: tracks.len() as u64,
                }
            })
            .collect();
        Ok(audits)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let working = self.working.take().ok_or(StoreError::Closed)?;
        let mut committed = self.committed.write().map_err(|_| lock_poisoned())?;
        *committed = working;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.working.take().ok_or(StoreError::Closed)?;
        Ok(())
    }
}
