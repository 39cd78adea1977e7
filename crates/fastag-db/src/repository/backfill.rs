//! # Sales Ledger Backfill
//!
//! One-off reconciliation job populating `fastag_sales` from pre-existing
//! ticket and inventory records. Deployments that predate the ledger run it
//! once after migrating; running it again is harmless.
//!
//! Both passes are existence-guarded INSERT...SELECT statements inside one
//! transaction, so partial inserts cannot occur and re-runs insert nothing.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;
use crate::schema::SchemaCapabilities;
use fastag_core::{BackfillSummary, SETTLED_TICKET_STATUSES};

/// Repository running the ledger reconciliation job.
#[derive(Debug, Clone)]
pub struct BackfillRepository {
    pool: SqlitePool,
    caps: Arc<SchemaCapabilities>,
}

impl BackfillRepository {
    /// Creates a new BackfillRepository.
    pub fn new(pool: SqlitePool, caps: Arc<SchemaCapabilities>) -> Self {
        BackfillRepository { pool, caps }
    }

    /// Populates the ledger from tickets and sold units. Idempotent.
    ///
    /// ## Pass (a): settled tickets
    /// Every settled ticket referencing a serial inserts a ledger row carrying
    /// the ticket's financials, unless a row for that exact
    /// `(serial, ticket_id)` pair already exists. Unit attributes come from a
    /// LEFT JOIN: a ticket whose serial no longer matches a unit still gets a
    /// row, with null frozen attributes.
    ///
    /// ## Pass (b): orphaned sold units
    /// Every `status='sold'` unit with no ledger row at all gets a minimal
    /// row (null ticket and financial fields).
    pub async fn backfill_sales_ledger(&self) -> DbResult<BackfillSummary> {
        let settled = SETTLED_TICKET_STATUSES
            .iter()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await?;

        let from_tickets = format!(
            "INSERT INTO fastag_sales (tag_serial, ticket_id, vehicle_reg_no, bank_name, \
             fastag_class, supplier_id, sold_by_user_id, payment_to_collect, payment_to_send, \
             net_value, commission_amount, created_at) \
             SELECT t.fastag_serial, t.id, t.vehicle_reg_no, f.bank_name, f.fastag_class, \
             f.supplier_id, t.lead_received_from_user_id, t.payment_to_collect, \
             t.payment_to_send, t.net_value, t.commission_amount, t.created_at \
             FROM tickets t LEFT JOIN fastags f ON f.tag_serial = t.fastag_serial \
             WHERE t.fastag_serial IS NOT NULL AND t.fastag_serial != '' \
             AND t.status IN ({settled}) \
             AND NOT EXISTS (SELECT 1 FROM fastag_sales s \
                 WHERE s.tag_serial = t.fastag_serial AND s.ticket_id = t.id)"
        );
        let inserted_from_tickets = sqlx::query(&from_tickets)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let unit_seller = if self.caps.has_unit_sold_by_user_id() {
            "f.sold_by_user_id"
        } else {
            "NULL"
        };
        let from_units = format!(
            "INSERT INTO fastag_sales (tag_serial, bank_name, fastag_class, supplier_id, \
             sold_by_user_id, created_at) \
             SELECT f.tag_serial, f.bank_name, f.fastag_class, f.supplier_id, {unit_seller}, ?1 \
             FROM fastags f WHERE f.status = 'sold' \
             AND NOT EXISTS (SELECT 1 FROM fastag_sales s WHERE s.tag_serial = f.tag_serial)"
        );
        let inserted_from_units = sqlx::query(&from_units)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        info!(
            inserted_from_tickets,
            inserted_from_units, "Sales ledger backfill complete"
        );
        Ok(BackfillSummary {
            inserted_from_tickets,
            inserted_from_units,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
