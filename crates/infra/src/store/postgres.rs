//! Postgres-backed sales store over the Chinook schema.
//!
//! Tables and columns use the quoted PascalCase names of the Chinook sample
//! database (`"Invoice"."InvoiceId"`, ...). Money columns are `NUMERIC(10,2)`;
//! they are converted to and from integer cents inside SQL so no decimal type
//! crosses the wire.
//!
//! ## Error Mapping
//!
//! | SQLSTATE | StoreError | Scenario |
//! |----------|------------|----------|
//! | `23505` | `Conflict` | Duplicate primary key |
//! | `40001` | `Conflict` | Serialization failure under `REPEATABLE READ` |
//! | `23503` | `Integrity` | Foreign key violation (stale sampled id) |
//! | `23514` | `Integrity` | Check constraint violation |
//! | `42P01` | `SchemaMissing` | Relation (table or sequence) does not exist |
//! | other | `Backend` | Any other database error |
//! | PoolClosed / Io / PoolTimedOut | `Unavailable` | Connection problems |
//!
//! ## Isolation
//!
//! Every unit of work runs under `REPEATABLE READ`, so all sampling queries of
//! a batch see one consistent snapshot. `nextval` is non-transactional in
//! Postgres, which gives the never-rolled-back sequence semantics for free.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};

use salesim_core::{
    BillingAddress, Customer, CustomerId, Invoice, InvoiceAudit, InvoiceId, InvoiceLine, Money,
    TimeWindow, Track, TrackId,
};

use super::{SalesStore, SalesTx, Sequence, StoreError};
use crate::config::DbConfig;

/// Postgres [`SalesStore`].
///
/// Uses the SQLx connection pool, which is thread-safe (Arc + Send + Sync).
#[derive(Debug, Clone)]
pub struct PostgresSalesStore {
    pool: Arc<PgPool>,
}

impl PostgresSalesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a connection pool with the given settings.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SalesStore for PostgresSalesStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn SalesTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(Box::new(PostgresTx { tx: Some(tx) }))
    }

    #[instrument(skip(self), err)]
    async fn ensure_sequences(&self) -> Result<(), StoreError> {
        for seq in Sequence::ALL {
            // Sequence names are fixed identifiers, never user input.
            sqlx::query(&format!("CREATE SEQUENCE IF NOT EXISTS {}", seq.name()))
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("create_sequence", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, seq), fields(sequence = %seq), err)]
    async fn resync_sequence(&self, seq: Sequence) -> Result<i64, StoreError> {
        let (table, column) = match seq {
            Sequence::Invoice => (r#""Invoice""#, r#""InvoiceId""#),
            Sequence::InvoiceLine => (r#""InvoiceLine""#, r#""InvoiceLineId""#),
        };

        // is_called = false: the next nextval() returns exactly this value.
        let sql = format!(
            "SELECT setval('{}', COALESCE(MAX({column}), 0) + 1, false) AS next_value FROM {table}",
            seq.name()
        );
        let row = sqlx::query(&sql)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("resync_sequence", e))?;
        let next: i64 = row
            .try_get("next_value")
            .map_err(|e| map_sqlx_error("resync_sequence", e))?;

        debug!(sequence = %seq, next, "sequence resynchronized");
        Ok(next)
    }

    #[instrument(skip(self), err)]
    async fn check_schema(&self) -> Result<(), StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence_name::text AS sequence_name
            FROM information_schema.sequences
            WHERE sequence_schema = current_schema()
              AND sequence_name IN ('invoice_id_seq', 'invoice_line_id_seq')
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("check_schema", e))?;

        let found: BTreeSet<String> = rows
            .iter()
            .filter_map(|r| r.try_get::<String, _>("sequence_name").ok())
            .collect();
        let missing: Vec<&str> = Sequence::ALL
            .iter()
            .map(|s| s.name())
            .filter(|name| !found.contains(*name))
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

/// Unit of work on one pooled connection.
pub struct PostgresTx {
    /// `None` once committed or rolled back. Dropping an open transaction
    /// rolls it back.
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTx {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::Closed)
    }
}

fn track_ids(set: &BTreeSet<TrackId>) -> Vec<i32> {
    set.iter().map(|id| id.get()).collect()
}

fn count_from(row: &PgRow, operation: &str) -> Result<u64, StoreError> {
    let n: i64 = row
        .try_get("n")
        .map_err(|e| map_sqlx_error(operation, e))?;
    Ok(n.max(0) as u64)
}

fn offset_param(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

#[async_trait]
impl SalesTx for PostgresTx {
    #[instrument(skip(self, seq), fields(sequence = %seq), err)]
    async fn next_value(&mut self, seq: Sequence) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT nextval($1::regclass) AS value")
            .bind(seq.name())
            .fetch_one(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("nextval", e))?;
        row.try_get("value").map_err(|e| map_sqlx_error("nextval", e))
    }

    #[instrument(skip(self), err)]
    async fn count_customers(&mut self) -> Result<u64, StoreError> {
        let row = sqlx::query(r#"SELECT COUNT(*) AS n FROM "Customer""#)
            .fetch_one(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("count_customers", e))?;
        count_from(&row, "count_customers")
    }

    #[instrument(skip(self), err)]
    async fn customer_at(&mut self, offset: u64) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT "CustomerId", "Address", "City", "State", "Country", "PostalCode"
            FROM "Customer"
            ORDER BY "CustomerId"
            OFFSET $1
            LIMIT 1
            "#,
        )
        .bind(offset_param(offset))
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("customer_at", e))?;

        row.map(|r| customer_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("customer_at", e))
    }

    #[instrument(skip(self, excluded), fields(excluded = excluded.len()), err)]
    async fn count_tracks_excluding(&mut self, excluded: &BTreeSet<TrackId>) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS n FROM "Track" WHERE NOT ("TrackId" = ANY($1::int4[]))"#,
        )
        .bind(track_ids(excluded))
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("count_tracks", e))?;
        count_from(&row, "count_tracks")
    }

    #[instrument(skip(self, excluded), fields(excluded = excluded.len()), err)]
    async fn track_at_excluding(
        &mut self,
        excluded: &BTreeSet<TrackId>,
        offset: u64,
    ) -> Result<Option<Track>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT "TrackId", ("UnitPrice" * 100)::bigint AS unit_price_cents
            FROM "Track"
            WHERE NOT ("TrackId" = ANY($1::int4[]))
            ORDER BY "TrackId"
            OFFSET $2
            LIMIT 1
            "#,
        )
        .bind(track_ids(excluded))
        .bind(offset_param(offset))
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("track_at", e))?;

        row.map(|r| -> Result<Track, sqlx::Error> {
            Ok(Track {
                id: TrackId::new(r.try_get("TrackId")?),
                unit_price: Money::from_cents(r.try_get("unit_price_cents")?),
            })
        })
        .transpose()
        .map_err(|e| map_sqlx_error("track_at", e))
    }

    #[instrument(skip(self, window, min_total), fields(from = %window.from, to = %window.to, min_total = %min_total), err)]
    async fn count_invoices_in(&mut self, window: TimeWindow, min_total: Money) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM "Invoice"
            WHERE "InvoiceDate" BETWEEN $1 AND $2
              AND "Total" > ($3::bigint::numeric / 100)
            "#,
        )
        .bind(window.from)
        .bind(window.to)
        .bind(min_total.cents())
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("count_invoices", e))?;
        count_from(&row, "count_invoices")
    }

    #[instrument(skip(self, window, min_total), fields(from = %window.from, to = %window.to, min_total = %min_total), err)]
    async fn invoice_in_at(
        &mut self,
        window: TimeWindow,
        min_total: Money,
        offset: u64,
    ) -> Result<Option<InvoiceId>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT "InvoiceId"
            FROM "Invoice"
            WHERE "InvoiceDate" BETWEEN $1 AND $2
              AND "Total" > ($3::bigint::numeric / 100)
            ORDER BY "InvoiceId"
            OFFSET $4
            LIMIT 1
            "#,
        )
        .bind(window.from)
        .bind(window.to)
        .bind(min_total.cents())
        .bind(offset_param(offset))
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("invoice_at", e))?;

        row.map(|r| r.try_get::<i32, _>("InvoiceId").map(InvoiceId::new))
            .transpose()
            .map_err(|e| map_sqlx_error("invoice_at", e))
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice), err)]
    async fn invoice_track_ids(&mut self, invoice: InvoiceId) -> Result<BTreeSet<TrackId>, StoreError> {
        let rows = sqlx::query(r#"SELECT "TrackId" FROM "InvoiceLine" WHERE "InvoiceId" = $1"#)
            .bind(invoice.get())
            .fetch_all(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("invoice_track_ids", e))?;

        rows.iter()
            .map(|r| r.try_get::<i32, _>("TrackId").map(TrackId::new))
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|e| map_sqlx_error("invoice_track_ids", e))
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id, customer_id = %invoice.customer_id), err)]
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO "Invoice" (
                "InvoiceId",
                "CustomerId",
                "InvoiceDate",
                "BillingAddress",
                "BillingCity",
                "BillingState",
                "BillingCountry",
                "BillingPostalCode",
                "Total"
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, ($9::bigint::numeric / 100))
            "#,
        )
        .bind(invoice.id.get())
        .bind(invoice.customer_id.get())
        .bind(invoice.invoice_date)
        .bind(invoice.billing.address.as_deref())
        .bind(invoice.billing.city.as_deref())
        .bind(invoice.billing.state.as_deref())
        .bind(invoice.billing.country.as_deref())
        .bind(invoice.billing.postal_code.as_deref())
        .bind(invoice.total.cents())
        .execute(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;
        Ok(())
    }

    #[instrument(skip(self, line), fields(line_id = %line.id, invoice_id = %line.invoice_id, track_id = %line.track_id), err)]
    async fn insert_invoice_line(&mut self, line: &InvoiceLine) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO "InvoiceLine" (
                "InvoiceLineId",
                "InvoiceId",
                "TrackId",
                "UnitPrice",
                "Quantity"
            )
            VALUES ($1, $2, $3, ($4::bigint::numeric / 100), $5)
            "#,
        )
        .bind(line.id.get())
        .bind(line.invoice_id.get())
        .bind(line.track_id.get())
        .bind(line.unit_price.cents())
        .bind(line.quantity)
        .execute(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice_line", e))?;
        Ok(())
    }

    #[instrument(skip(self, invoice, total), fields(invoice_id = %invoice, total = %total), err)]
    async fn update_invoice_total(&mut self, invoice: InvoiceId, total: Money) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE "Invoice" SET "Total" = ($2::bigint::numeric / 100) WHERE "InvoiceId" = $1"#,
        )
        .bind(invoice.get())
        .bind(total.cents())
        .execute(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("update_invoice_total", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Integrity(format!("invoice {invoice} does not exist")));
        }
        Ok(())
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice), err)]
    async fn recompute_invoice_total(&mut self, invoice: InvoiceId) -> Result<Money, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE "Invoice"
            SET "Total" = COALESCE(
                (SELECT SUM("UnitPrice" * "Quantity") FROM "InvoiceLine" WHERE "InvoiceId" = $1),
                0
            )
            WHERE "InvoiceId" = $1
            RETURNING ("Total" * 100)::bigint AS total_cents
            "#,
        )
        .bind(invoice.get())
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("recompute_invoice_total", e))?;

        match row {
            Some(r) => Ok(Money::from_cents(
                r.try_get("total_cents")
                    .map_err(|e| map_sqlx_error("recompute_invoice_total", e))?,
            )),
            None => Err(StoreError::Integrity(format!("invoice {invoice} does not exist"))),
        }
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice), err)]
    async fn delete_invoice_lines(&mut self, invoice: InvoiceId) -> Result<u64, StoreError> {
        let result = sqlx::query(r#"DELETE FROM "InvoiceLine" WHERE "InvoiceId" = $1"#)
            .bind(invoice.get())
            .execute(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice_lines", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice), err)]
    async fn delete_invoice(&mut self, invoice: InvoiceId) -> Result<u64, StoreError> {
        let result = sqlx::query(r#"DELETE FROM "Invoice" WHERE "InvoiceId" = $1"#)
            .bind(invoice.get())
            .execute(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, window), fields(from = %window.from, to = %window.to), err)]
    async fn audit_invoices(&mut self, window: TimeWindow) -> Result<Vec<InvoiceAudit>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                i."InvoiceId" AS invoice_id,
                i."InvoiceDate" AS invoice_date,
                (i."Total" * 100)::bigint AS stored_cents,
                COALESCE((SUM(il."UnitPrice" * il."Quantity") * 100)::bigint, 0) AS line_cents,
                COUNT(il."InvoiceLineId") AS line_count,
                COUNT(DISTINCT il."TrackId") AS distinct_tracks
            FROM "Invoice" i
            LEFT JOIN "InvoiceLine" il ON il."InvoiceId" = i."InvoiceId"
            WHERE i."InvoiceDate" BETWEEN $1 AND $2
            GROUP BY i."InvoiceId", i."InvoiceDate", i."Total"
            ORDER BY i."InvoiceId"
            "#,
        )
        .bind(window.from)
        .bind(window.to)
        .fetch_all(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("audit_invoices", e))?;

        rows.iter()
            .map(|r| -> Result<InvoiceAudit, sqlx::Error> {
                let line_count: i64 = r.try_get("line_count")?;
                let distinct_tracks: i64 = r.try_get("distinct_tracks")?;
                Ok(InvoiceAudit {
                    invoice_id: InvoiceId::new(r.try_get("invoice_id")?),
                    invoice_date: r.try_get::<NaiveDateTime, _>("invoice_date")?,
                    stored_total: Money::from_cents(r.try_get("stored_cents")?),
                    line_total: Money::from_cents(r.try_get("line_cents")?),
                    line_count: line_count.max(0) as u64,
                    distinct_tracks: distinct_tracks.max(0) as u64,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("audit_invoices", e))
    }

    #[instrument(skip(self), err)]
    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn customer_from_row(row: &PgRow) -> Result<Customer, sqlx::Error> {
    Ok(Customer {
        id: CustomerId::new(row.try_get("CustomerId")?),
        address: BillingAddress {
            address: row.try_get("Address")?,
            city: row.try_get("City")?,
            state: row.try_get("State")?,
            country: row.try_get("Country")?,
            postal_code: row.try_get("PostalCode")?,
        },
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some(code) => store_error_for_code(code, msg),
                None => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{} in {}", err, operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn store_error_for_code(code: &str, msg: String) -> StoreError {
    match code {
        // unique_violation, serialization_failure
        "23505" | "40001" => StoreError::Conflict(msg),
        // foreign_key_violation, check_violation
        "23503" | "23514" => StoreError::Integrity(msg),
        // undefined_table (also raised for a missing sequence)
        "42P01" => StoreError::SchemaMissing(msg),
        _ => StoreError::Backend(msg),
    }
}
