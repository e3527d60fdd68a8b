//! Batch orchestration.
//!
//! A batch runs cancels, then augments, then creates, all inside one unit of
//! work. Running creates last keeps augment and cancel from ever targeting an
//! invoice the same batch produced. Any error rolls the whole batch back; id
//! sequence advances are not undone.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, instrument, warn};

use salesim_infra::{SalesStore, SalesTx};

use crate::allocator::{self, SequenceState};
use crate::batch::{BatchRequest, BatchResult, Outcome};
use crate::calendar;
use crate::config::SimulatorConfig;
use crate::error::SimError;
use crate::operations::{self, TargetWindow};
use crate::sampler::EntitySampler;
use crate::verify::VerificationReport;

/// The simulator's public surface: setup, readiness, batch runs and
/// post-run verification against one [`SalesStore`].
pub struct Simulator<S, R = StdRng> {
    store: S,
    sampler: EntitySampler<R>,
    config: SimulatorConfig,
}

impl<S: SalesStore> Simulator<S, StdRng> {
    /// Seeded from `config.seed` when set, from the OS otherwise.
    pub fn from_config(store: S, config: SimulatorConfig) -> Result<Self, SimError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(store, rng, config)
    }
}

impl<S: SalesStore, R: Rng + Send> Simulator<S, R> {
    pub fn new(store: S, rng: R, config: SimulatorConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            store,
            sampler: EntitySampler::new(rng),
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Create the id sequences if needed and resync them with the tables.
    /// Safe to call any number of times.
    pub async fn setup(&self) -> Result<SequenceState, SimError> {
        allocator::resync(&self.store).await
    }

    /// Fails with `SchemaMissing` until [`setup`](Self::setup) has run.
    #[instrument(skip(self), err)]
    pub async fn check_ready(&self) -> Result<(), SimError> {
        self.store.check_schema().await?;
        debug!("database ready for simulation");
        Ok(())
    }

    /// Validate raw counts, then run the batch.
    pub async fn run(
        &mut self,
        target_date: NaiveDate,
        creates: i64,
        updates: i64,
        deletes: i64,
    ) -> Result<BatchResult, SimError> {
        let request = BatchRequest::new(target_date, creates, updates, deletes)?;
        self.run_batch(&request).await
    }

    /// Run one batch atomically: every effect lands or none does.
    #[instrument(
        skip(self, request),
        fields(
            date = %request.target_date,
            creates = request.creates,
            updates = request.updates,
            deletes = request.deletes
        ),
        err
    )]
    pub async fn run_batch(&mut self, request: &BatchRequest) -> Result<BatchResult, SimError> {
        info!("starting batch");
        let mut tx = self.store.begin().await?;

        match self.apply(tx.as_mut(), request).await {
            Ok(result) => {
                tx.commit().await?;
                let summary = result.summary();
                info!(
                    created = summary.created,
                    updated = summary.updated,
                    updates_skipped = summary.updates_skipped,
                    deleted = summary.deleted,
                    deletes_skipped = summary.deletes_skipped,
                    revenue = %summary.revenue,
                    average_sale = %summary.average_sale.unwrap_or_default(),
                    "batch committed"
                );
                Ok(result)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                error!(error = %err, "batch aborted and rolled back");
                Err(err)
            }
        }
    }

    async fn apply(&mut self, tx: &mut dyn SalesTx, request: &BatchRequest) -> Result<BatchResult, SimError> {
        let target = TargetWindow {
            reference: calendar::start_of_day(request.target_date),
            window_days: self.config.window_days,
            min_total: self.config.min_total,
        };
        let mut result = BatchResult::new(request.target_date);

        for done in 1..=request.deletes {
            let outcome = operations::cancel_sale(tx, &mut self.sampler, target).await?;
            if let Outcome::Skipped(reason) = outcome {
                debug!(%reason, "cancel skipped");
            }
            result.deleted.push(outcome);
            log_progress("cancel", done, request.deletes);
        }

        for done in 1..=request.updates {
            let outcome = operations::augment_sale(tx, &mut self.sampler, target).await?;
            if let Outcome::Skipped(reason) = outcome {
                debug!(%reason, "augment skipped");
            }
            result.updated.push(outcome);
            log_progress("augment", done, request.updates);
        }

        let stamps = self.sampler.timestamps(request.target_date, request.creates);
        for (done, invoice_date) in (1..).zip(stamps) {
            let sale =
                operations::create_sale(tx, &mut self.sampler, invoice_date, self.config.max_items_per_sale).await?;
            result.created.push(sale);
            log_progress("create", done, request.creates);
        }

        Ok(result)
    }

    /// Read-only audit of every invoice dated on `date`.
    #[instrument(skip(self), err)]
    pub async fn verify_day(&self, date: NaiveDate) -> Result<VerificationReport, SimError> {
        let mut tx = self.store.begin().await?;
        let audits = tx.audit_invoices(calendar::day_window(date)).await;
        tx.rollback().await?;

        let report = VerificationReport::from_audits(date, &audits?);
        info!(
            invoices = report.invoice_count,
            multi_line = report.multi_line_invoices,
            mismatched_totals = report.mismatched_totals.len(),
            duplicate_tracks = report.duplicate_track_invoices.len(),
            "verification finished"
        );
        Ok(report)
    }
}

/// Every item for small runs, every tenth of the run otherwise.
fn progress_step(total: u32) -> u32 {
    if total <= 10 { 1 } else { total / 10 }
}

fn log_progress(kind: &'static str, done: u32, total: u32) {
    if done % progress_step(total) == 0 || done == total {
        info!(kind, done, total, "progress");
    }
}
