//! # Sales Ledger Engine
//!
//! Marking units sold, revoking sales, and correcting sales recorded against
//! the wrong serial.
//!
//! ## Ledger Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     fastag_sales Discipline                             │
//! │                                                                         │
//! │  INSERT  - when a unit transitions to sold (bulk, ticket flow, or the  │
//! │            re-attribution half of a correction). The row freezes the   │
//! │            unit's bank/class/supplier as they were BEFORE the update.  │
//! │                                                                         │
//! │  DELETE  - only ever the LATEST row for a serial (revoke, or the undo  │
//! │            half of a correction). Older rows stay as history.          │
//! │                                                                         │
//! │  UPDATE  - never. Corrections are delete + reinsert.                   │
//! │                                                                         │
//! │  The row with MAX(id) per serial is the current sale.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Correction Flow
//! ```text
//! correct_sale(wrong, correct):
//!   1. correct exists?                 no → NotFound
//!   2. correct already sold?          yes → AlreadySold
//!   3. correct mapping done?           no → MappingNotDone   (if tracked)
//!   4. correct has a ledger row?      yes → DuplicateSaleRecord
//!   5. delete wrong's latest row; none left → wrong reverts to in_stock
//!   6. mark correct sold; insert replacement row (correct's OWN bank/class,
//!      seller carried over from wrong's row unless overridden)
//!   All six steps in ONE transaction: no partial effect.
//! ```
//!
//! ## Race Guard
//! SQLite gives no SELECT...FOR UPDATE; the lost-update guard is the
//! `status != 'sold'` predicate on every sold-transition UPDATE, checked via
//! rows_affected inside the transaction. Two concurrent mark-sold calls on
//! one serial cannot both insert a ledger row: the loser sees zero affected
//! rows and fails with AlreadySold.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::inventory::fetch_unit;
use crate::schema::SchemaCapabilities;
use fastag_core::validation::{validate_serial, validate_serials};
use fastag_core::{SaleFinancials, SaleRecord, UnitStatus, ValidationError};

const SALE_SELECT: &str = "SELECT id, tag_serial, ticket_id, vehicle_reg_no, bank_name, \
     fastag_class, supplier_id, sold_by_user_id, sold_by_agent_id, payment_to_collect, \
     payment_to_send, net_value, commission_amount, created_at FROM fastag_sales";

/// Repository for sale events: mark-sold, revoke, correct.
#[derive(Debug, Clone)]
pub struct SalesRepository {
    pool: SqlitePool,
    caps: Arc<SchemaCapabilities>,
}

impl SalesRepository {
    /// Creates a new SalesRepository.
    pub fn new(pool: SqlitePool, caps: Arc<SchemaCapabilities>) -> Self {
        SalesRepository { pool, caps }
    }

    /// Marks a batch of serials sold in one transaction.
    ///
    /// ## Seller Attribution
    /// The explicit `seller_id` wins. Without one, each unit's prior owner is
    /// used: `assigned_to` (end-user) over `assigned_to_agent_id` (agent).
    ///
    /// ## Atomicity
    /// Any missing or already-sold serial fails the whole batch; no unit is
    /// left partially sold.
    pub async fn bulk_mark_sold(
        &self,
        serials: &[String],
        seller_id: Option<i64>,
    ) -> DbResult<u64> {
        validate_serials(serials)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for serial in serials {
            let unit = fetch_unit(&mut *tx, &self.caps, serial)
                .await?
                .ok_or_else(|| DbError::not_found("FASTag", serial))?;

            if unit.status == UnitStatus::Sold {
                return Err(DbError::AlreadySold {
                    serial: serial.clone(),
                });
            }

            // Snapshot BEFORE mutating: the ledger row freezes the unit's
            // pre-sale attributes and prior ownership.
            let credited = seller_id.or(unit.seller_fallback());

            let updated = mark_unit_sold(&mut tx, &self.caps, unit.id, credited, now).await?;
            if !updated {
                return Err(DbError::AlreadySold {
                    serial: serial.clone(),
                });
            }

            insert_sale_row(
                &mut tx,
                &NewSaleRow {
                    tag_serial: serial.clone(),
                    ticket_id: None,
                    vehicle_reg_no: None,
                    bank_name: Some(unit.bank_name.clone()),
                    fastag_class: Some(unit.fastag_class.clone()),
                    supplier_id: unit.supplier_id,
                    sold_by_user_id: credited,
                    sold_by_agent_id: unit.assigned_to_agent_id,
                    financials: SaleFinancials::default(),
                },
                now,
            )
            .await?;
        }

        tx.commit().await?;

        info!(count = serials.len(), "Units marked sold");
        Ok(serials.len() as u64)
    }

    /// Records a single sale produced by a customer service ticket.
    ///
    /// Same snapshot and atomicity rules as [`bulk_mark_sold`], with the
    /// ticket linkage and financial fields carried onto the ledger row.
    ///
    /// [`bulk_mark_sold`]: SalesRepository::bulk_mark_sold
    pub async fn record_ticket_sale(
        &self,
        serial: &str,
        ticket_id: i64,
        vehicle_reg_no: Option<&str>,
        financials: &SaleFinancials,
        seller_id: Option<i64>,
    ) -> DbResult<SaleRecord> {
        validate_serial(serial)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let unit = fetch_unit(&mut *tx, &self.caps, serial)
            .await?
            .ok_or_else(|| DbError::not_found("FASTag", serial))?;

        if unit.status == UnitStatus::Sold {
            return Err(DbError::AlreadySold {
                serial: serial.to_string(),
            });
        }

        let credited = seller_id.or(unit.seller_fallback());

        let updated = mark_unit_sold(&mut tx, &self.caps, unit.id, credited, now).await?;
        if !updated {
            return Err(DbError::AlreadySold {
                serial: serial.to_string(),
            });
        }

        let row = NewSaleRow {
            tag_serial: serial.to_string(),
            ticket_id: Some(ticket_id),
            vehicle_reg_no: vehicle_reg_no.map(str::to_string),
            bank_name: Some(unit.bank_name.clone()),
            fastag_class: Some(unit.fastag_class.clone()),
            supplier_id: unit.supplier_id,
            sold_by_user_id: credited,
            sold_by_agent_id: unit.assigned_to_agent_id,
            financials: financials.clone(),
        };
        let id = insert_sale_row(&mut tx, &row, now).await?;

        tx.commit().await?;

        info!(serial = %serial, ticket_id, "Ticket sale recorded");
        Ok(row.into_record(id, now))
    }

    /// Undoes a sale: deletes the latest ledger row for the serial.
    ///
    /// The unit reverts to `revert_to` (default `in_stock`) only when no
    /// older ledger row remains; with history left, the latest remaining sale
    /// event stands and the unit stays sold.
    pub async fn revoke_sale(&self, serial: &str, revert_to: Option<UnitStatus>) -> DbResult<()> {
        validate_serial(serial)?;
        let revert_to = revert_to.unwrap_or(UnitStatus::InStock);
        if revert_to == UnitStatus::Sold {
            return Err(
                ValidationError::invalid_format("revert_to_status", "cannot revert to sold")
                    .into(),
            );
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let latest = latest_sale_tx(&mut tx, serial)
            .await?
            .ok_or_else(|| DbError::not_found("Sale record", serial))?;

        sqlx::query("DELETE FROM fastag_sales WHERE id = ?1")
            .bind(latest.id)
            .execute(&mut *tx)
            .await?;

        let remaining = count_sales_tx(&mut tx, serial).await?;
        if remaining == 0 {
            revert_unit(&mut tx, &self.caps, serial, revert_to, now).await?;
        }

        tx.commit().await?;

        info!(serial = %serial, remaining, "Sale revoked");
        Ok(())
    }

    /// Re-attributes a sale recorded against the wrong serial.
    ///
    /// ## Errors (validated before any write, in this order)
    /// * `NotFound` - correct serial does not exist
    /// * `AlreadySold` - correct serial is already sold
    /// * `MappingNotDone` - correct serial's bank mapping is pending
    ///   (only on schemas that track mapping)
    /// * `DuplicateSaleRecord` - correct serial already has a ledger row
    /// * `NotFound` - wrong serial has no ledger row to move
    pub async fn correct_sale(
        &self,
        wrong_serial: &str,
        correct_serial: &str,
        seller_id: Option<i64>,
    ) -> DbResult<()> {
        validate_serial(wrong_serial)?;
        validate_serial(correct_serial)?;
        if wrong_serial == correct_serial {
            return Err(ValidationError::invalid_format(
                "correct_serial",
                "must differ from the wrong serial",
            )
            .into());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let correct_unit = fetch_unit(&mut *tx, &self.caps, correct_serial)
            .await?
            .ok_or_else(|| DbError::not_found("FASTag", correct_serial))?;

        if correct_unit.status == UnitStatus::Sold {
            return Err(DbError::AlreadySold {
                serial: correct_serial.to_string(),
            });
        }

        if self.caps.tracks_mapping() && !correct_unit.mapping_done() {
            return Err(DbError::MappingNotDone {
                serial: correct_serial.to_string(),
            });
        }

        if count_sales_tx(&mut tx, correct_serial).await? > 0 {
            return Err(DbError::DuplicateSaleRecord {
                serial: correct_serial.to_string(),
            });
        }

        let wrong_latest = latest_sale_tx(&mut tx, wrong_serial)
            .await?
            .ok_or_else(|| DbError::not_found("Sale record", wrong_serial))?;

        let credited = seller_id.or(wrong_latest.credited_to());

        // Undo half: drop the wrong row; revert the wrong unit only when no
        // older sale event remains for it.
        sqlx::query("DELETE FROM fastag_sales WHERE id = ?1")
            .bind(wrong_latest.id)
            .execute(&mut *tx)
            .await?;

        if count_sales_tx(&mut tx, wrong_serial).await? == 0 {
            revert_unit(&mut tx, &self.caps, wrong_serial, UnitStatus::InStock, now).await?;
        }

        // Redo half: sell the correct unit under its OWN attributes, carrying
        // the ticket linkage and financials over from the wrong row.
        let updated =
            mark_unit_sold(&mut tx, &self.caps, correct_unit.id, credited, now).await?;
        if !updated {
            return Err(DbError::AlreadySold {
                serial: correct_serial.to_string(),
            });
        }

        insert_sale_row(
            &mut tx,
            &NewSaleRow {
                tag_serial: correct_serial.to_string(),
                ticket_id: wrong_latest.ticket_id,
                vehicle_reg_no: wrong_latest.vehicle_reg_no.clone(),
                bank_name: Some(correct_unit.bank_name.clone()),
                fastag_class: Some(correct_unit.fastag_class.clone()),
                supplier_id: correct_unit.supplier_id,
                sold_by_user_id: credited,
                sold_by_agent_id: wrong_latest.sold_by_agent_id,
                financials: SaleFinancials {
                    payment_to_collect: wrong_latest.payment_to_collect,
                    payment_to_send: wrong_latest.payment_to_send,
                    net_value: wrong_latest.net_value,
                    commission_amount: wrong_latest.commission_amount,
                },
            },
            now,
        )
        .await?;

        tx.commit().await?;

        info!(
            wrong = %wrong_serial,
            correct = %correct_serial,
            seller = ?credited,
            "Sale corrected"
        );
        Ok(())
    }

    /// The current (max-id) sale event for a serial.
    pub async fn latest_sale(&self, serial: &str) -> DbResult<Option<SaleRecord>> {
        validate_serial(serial)?;
        let sql = format!("{SALE_SELECT} WHERE tag_serial = ?1 ORDER BY id DESC LIMIT 1");
        let record = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(serial)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// All sale events for a serial, newest first.
    pub async fn history_for_serial(&self, serial: &str) -> DbResult<Vec<SaleRecord>> {
        validate_serial(serial)?;
        let sql = format!("{SALE_SELECT} WHERE tag_serial = ?1 ORDER BY id DESC");
        let records = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(serial)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Fields of a ledger row about to be inserted.
#[derive(Debug, Clone)]
struct NewSaleRow {
    tag_serial: String,
    ticket_id: Option<i64>,
    vehicle_reg_no: Option<String>,
    bank_name: Option<String>,
    fastag_class: Option<String>,
    supplier_id: Option<i64>,
    sold_by_user_id: Option<i64>,
    sold_by_agent_id: Option<i64>,
    financials: SaleFinancials,
}

impl NewSaleRow {
    fn into_record(self, id: i64, created_at: DateTime<Utc>) -> SaleRecord {
        SaleRecord {
            id,
            tag_serial: self.tag_serial,
            ticket_id: self.ticket_id,
            vehicle_reg_no: self.vehicle_reg_no,
            bank_name: self.bank_name,
            fastag_class: self.fastag_class,
            supplier_id: self.supplier_id,
            sold_by_user_id: self.sold_by_user_id,
            sold_by_agent_id: self.sold_by_agent_id,
            payment_to_collect: self.financials.payment_to_collect,
            payment_to_send: self.financials.payment_to_send,
            net_value: self.financials.net_value,
            commission_amount: self.financials.commission_amount,
            created_at,
        }
    }
}

async fn latest_sale_tx(
    tx: &mut Transaction<'_, Sqlite>,
    serial: &str,
) -> DbResult<Option<SaleRecord>> {
    let sql = format!("{SALE_SELECT} WHERE tag_serial = ?1 ORDER BY id DESC LIMIT 1");
    let record = sqlx::query_as::<_, SaleRecord>(&sql)
        .bind(serial)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(record)
}

async fn count_sales_tx(tx: &mut Transaction<'_, Sqlite>, serial: &str) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fastag_sales WHERE tag_serial = ?1")
        .bind(serial)
        .fetch_one(&mut **tx)
        .await?;
    Ok(count)
}

/// Transitions a unit to sold with ownership cleared. Returns false when the
/// guarded UPDATE matched nothing (unit already sold by a concurrent call).
async fn mark_unit_sold(
    tx: &mut Transaction<'_, Sqlite>,
    caps: &SchemaCapabilities,
    unit_id: i64,
    credited: Option<i64>,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = if caps.has_unit_sold_by_user_id() {
        sqlx::query(
            "UPDATE fastags SET status = 'sold', assigned_to_agent_id = NULL, \
             assigned_to = NULL, sold_by_user_id = ?1, updated_at = ?2 \
             WHERE id = ?3 AND status != 'sold'",
        )
        .bind(credited)
        .bind(now)
        .bind(unit_id)
        .execute(&mut **tx)
        .await?
    } else {
        sqlx::query(
            "UPDATE fastags SET status = 'sold', assigned_to_agent_id = NULL, \
             assigned_to = NULL, updated_at = ?1 WHERE id = ?2 AND status != 'sold'",
        )
        .bind(now)
        .bind(unit_id)
        .execute(&mut **tx)
        .await?
    };
    Ok(result.rows_affected() == 1)
}

/// Reverts a sold unit to `status` with ownership cleared. Zero affected rows
/// are tolerated: the serial may no longer exist after a correction.
async fn revert_unit(
    tx: &mut Transaction<'_, Sqlite>,
    caps: &SchemaCapabilities,
    serial: &str,
    status: UnitStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    if caps.has_unit_sold_by_user_id() {
        sqlx::query(
            "UPDATE fastags SET status = ?1, assigned_to_agent_id = NULL, assigned_to = NULL, \
             sold_by_user_id = NULL, updated_at = ?2 WHERE tag_serial = ?3",
        )
        .bind(status)
        .bind(now)
        .bind(serial)
        .execute(&mut **tx)
        .await?;
    } else {
        sqlx::query(
            "UPDATE fastags SET status = ?1, assigned_to_agent_id = NULL, assigned_to = NULL, \
             updated_at = ?2 WHERE tag_serial = ?3",
        )
        .bind(status)
        .bind(now)
        .bind(serial)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn insert_sale_row(
    tx: &mut Transaction<'_, Sqlite>,
    row: &NewSaleRow,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        "INSERT INTO fastag_sales (tag_serial, ticket_id, vehicle_reg_no, bank_name, \
         fastag_class, supplier_id, sold_by_user_id, sold_by_agent_id, payment_to_collect, \
         payment_to_send, net_value, commission_amount, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )
    .bind(&row.tag_serial)
    .bind(row.ticket_id)
    .bind(&row.vehicle_reg_no)
    .bind(&row.bank_name)
    .bind(&row.fastag_class)
    .bind(row.supplier_id)
    .bind(row.sold_by_user_id)
    .bind(row.sold_by_agent_id)
    .bind(row.financials.payment_to_collect)
    .bind(row.financials.payment_to_send)
    .bind(row.financials.net_value)
    .bind(row.financials.commission_amount)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    debug!(serial = %row.tag_serial, "Ledger row inserted");
    Ok(result.last_insert_rowid())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use fastag_core::BankMappingStatus;

    /// Full lifecycle: in_stock → assigned(7) → sold(7) → revoked → in_stock.
    #[tokio::test]
    async fn test_sell_and_revoke_roundtrip() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["ABC-001-001"], "LIVQUIK", "class4", "B1").await;

        db.transfers()
            .transfer("admin", "7", "class4", "B1", None)
            .await
            .unwrap();

        let sold = db
            .sales()
            .bulk_mark_sold(&["ABC-001-001".to_string()], Some(7))
            .await
            .unwrap();
        assert_eq!(sold, 1);

        let unit = db
            .inventory()
            .get_by_serial("ABC-001-001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.status, UnitStatus::Sold);
        // Status exclusivity: sold implies both ownership columns are null.
        assert!(unit.assigned_to_agent_id.is_none());
        assert!(unit.assigned_to.is_none());
        assert_eq!(unit.sold_by_user_id, Some(7));

        let record = db.sales().latest_sale("ABC-001-001").await.unwrap().unwrap();
        assert_eq!(record.sold_by_user_id, Some(7));
        assert_eq!(record.sold_by_agent_id, Some(7));
        assert_eq!(record.bank_name.as_deref(), Some("LIVQUIK"));
        assert_eq!(db.sales().history_for_serial("ABC-001-001").await.unwrap().len(), 1);

        db.sales().revoke_sale("ABC-001-001", None).await.unwrap();

        assert!(db.sales().latest_sale("ABC-001-001").await.unwrap().is_none());
        let unit = db
            .inventory()
            .get_by_serial("ABC-001-001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.status, UnitStatus::InStock);
        assert!(unit.assigned_to_agent_id.is_none());
        assert!(unit.sold_by_user_id.is_none());
    }

    #[tokio::test]
    async fn test_seller_fallback_and_override() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["SF-1", "SF-2"], "LIVQUIK", "class4", "B1").await;
        db.transfers()
            .transfer("admin", "7", "class4", "B1", None)
            .await
            .unwrap();

        // No explicit seller: falls back to the prior agent owner.
        db.sales()
            .bulk_mark_sold(&["SF-1".to_string()], None)
            .await
            .unwrap();
        let record = db.sales().latest_sale("SF-1").await.unwrap().unwrap();
        assert_eq!(record.sold_by_user_id, Some(7));

        // Explicit seller always wins over the prior owner.
        db.sales()
            .bulk_mark_sold(&["SF-2".to_string()], Some(42))
            .await
            .unwrap();
        let record = db.sales().latest_sale("SF-2").await.unwrap().unwrap();
        assert_eq!(record.sold_by_user_id, Some(42));
        assert_eq!(record.sold_by_agent_id, Some(7));
    }

    #[tokio::test]
    async fn test_bulk_mark_sold_is_atomic() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["AT-1", "AT-2"], "LIVQUIK", "class4", "B1").await;

        let err = db
            .sales()
            .bulk_mark_sold(
                &["AT-1".to_string(), "GHOST-1".to_string(), "AT-2".to_string()],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        // AT-1 was updated inside the transaction, then rolled back.
        let unit = db.inventory().get_by_serial("AT-1").await.unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::InStock);
        assert!(db.sales().latest_sale("AT-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_sold_twice_fails_cleanly() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["TW-1"], "LIVQUIK", "class4", "B1").await;

        db.sales()
            .bulk_mark_sold(&["TW-1".to_string()], Some(7))
            .await
            .unwrap();
        let err = db
            .sales()
            .bulk_mark_sold(&["TW-1".to_string()], Some(9))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadySold { .. }));

        // Exactly one ledger row; the losing call inserted nothing.
        assert_eq!(db.sales().history_for_serial("TW-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_serials_provided() {
        let db = testutil::test_db().await;
        let err = db.sales().bulk_mark_sold(&[], None).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_record_ticket_sale_carries_financials() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["TKS-1"], "LIVQUIK", "class4", "B1").await;

        let financials = SaleFinancials {
            payment_to_collect: Some(50_000),
            payment_to_send: Some(40_000),
            net_value: Some(10_000),
            commission_amount: Some(2_500),
        };
        let record = db
            .sales()
            .record_ticket_sale("TKS-1", 301, Some("MH12AB1234"), &financials, Some(7))
            .await
            .unwrap();

        assert_eq!(record.ticket_id, Some(301));
        assert_eq!(record.vehicle_reg_no.as_deref(), Some("MH12AB1234"));
        assert_eq!(record.net_value, Some(10_000));

        let stored = db.sales().latest_sale("TKS-1").await.unwrap().unwrap();
        assert_eq!(stored.id, record.id);
        assert_eq!(stored.payment_to_collect, Some(50_000));
        assert_eq!(
            db.inventory()
                .get_by_serial("TKS-1")
                .await
                .unwrap()
                .unwrap()
                .status,
            UnitStatus::Sold
        );
    }

    #[tokio::test]
    async fn test_revoke_keeps_unit_sold_while_history_remains() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["HIST-1"], "LIVQUIK", "class4", "B1").await;

        db.sales()
            .bulk_mark_sold(&["HIST-1".to_string()], Some(7))
            .await
            .unwrap();
        // A second sale event for the same serial, as ticket backfill can
        // produce when two settled tickets reference one serial.
        testutil::seed_sale_row(&db, "HIST-1", Some(9), Some(801)).await;
        assert_eq!(db.sales().history_for_serial("HIST-1").await.unwrap().len(), 2);

        // First revoke deletes only the latest row; an older event remains,
        // so the unit stays sold.
        db.sales().revoke_sale("HIST-1", None).await.unwrap();
        let remaining = db.sales().history_for_serial("HIST-1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sold_by_user_id, Some(7));
        assert_eq!(
            db.inventory()
                .get_by_serial("HIST-1")
                .await
                .unwrap()
                .unwrap()
                .status,
            UnitStatus::Sold
        );

        // Second revoke empties the ledger and reverts the unit.
        db.sales().revoke_sale("HIST-1", None).await.unwrap();
        assert!(db.sales().latest_sale("HIST-1").await.unwrap().is_none());
        assert_eq!(
            db.inventory()
                .get_by_serial("HIST-1")
                .await
                .unwrap()
                .unwrap()
                .status,
            UnitStatus::InStock
        );
    }

    #[tokio::test]
    async fn test_correct_sale_moves_attribution() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["WR-1", "OK-1"], "LIVQUIK", "class4", "B1").await;
        db.transfers()
            .transfer("admin", "7", "class4", "B1", None)
            .await
            .unwrap();
        db.inventory()
            .update_mapping_status(&["OK-1".to_string()], BankMappingStatus::Done, None)
            .await
            .unwrap();

        db.sales()
            .bulk_mark_sold(&["WR-1".to_string()], None)
            .await
            .unwrap();

        db.sales().correct_sale("WR-1", "OK-1", None).await.unwrap();

        // Wrong serial: back in stock, no ledger row.
        let wrong = db.inventory().get_by_serial("WR-1").await.unwrap().unwrap();
        assert_eq!(wrong.status, UnitStatus::InStock);
        assert!(wrong.assigned_to_agent_id.is_none());
        assert!(db.sales().latest_sale("WR-1").await.unwrap().is_none());

        // Correct serial: sold, exactly one row, same seller as before.
        let correct = db.inventory().get_by_serial("OK-1").await.unwrap().unwrap();
        assert_eq!(correct.status, UnitStatus::Sold);
        let history = db.sales().history_for_serial("OK-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sold_by_user_id, Some(7));
        // The replacement row carries the correct unit's OWN bank/class.
        assert_eq!(history[0].bank_name.as_deref(), Some("LIVQUIK"));
    }

    #[tokio::test]
    async fn test_correct_sale_precondition_errors() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["CW-1", "CP-1", "CS-1", "CD-1"], "LIVQUIK", "class4", "B1")
            .await;
        db.sales()
            .bulk_mark_sold(&["CW-1".to_string()], Some(7))
            .await
            .unwrap();

        // Correct serial not found.
        let err = db
            .sales()
            .correct_sale("CW-1", "MISSING-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        // Correct serial already sold.
        db.inventory()
            .update_mapping_status(&["CS-1".to_string()], BankMappingStatus::Done, None)
            .await
            .unwrap();
        db.sales()
            .bulk_mark_sold(&["CS-1".to_string()], Some(9))
            .await
            .unwrap();
        let err = db.sales().correct_sale("CW-1", "CS-1", None).await.unwrap_err();
        assert!(matches!(err, DbError::AlreadySold { .. }));

        // Correct serial mapping pending.
        let err = db.sales().correct_sale("CW-1", "CP-1", None).await.unwrap_err();
        assert!(matches!(err, DbError::MappingNotDone { .. }));

        // Correct serial already has a sale record: CD-1 is in stock with
        // mapping done, but a stray ledger row (as a partial backfill can
        // leave behind) blocks the correction.
        db.inventory()
            .update_mapping_status(&["CD-1".to_string()], BankMappingStatus::Done, None)
            .await
            .unwrap();
        testutil::seed_sale_row(&db, "CD-1", Some(9), None).await;
        let err = db.sales().correct_sale("CW-1", "CD-1", None).await.unwrap_err();
        assert!(matches!(err, DbError::DuplicateSaleRecord { .. }));

        // Nothing about the wrong serial changed across all failures.
        assert_eq!(db.sales().history_for_serial("CW-1").await.unwrap().len(), 1);
        assert_eq!(
            db.inventory()
                .get_by_serial("CW-1")
                .await
                .unwrap()
                .unwrap()
                .status,
            UnitStatus::Sold
        );
    }

    #[tokio::test]
    async fn test_correct_sale_skips_mapping_check_on_bare_schema() {
        let (pool, caps) = testutil::bare_legacy_pool().await;
        let inventory =
            crate::repository::inventory::InventoryRepository::new(pool.clone(), caps.clone());
        let sales = SalesRepository::new(pool, caps);

        inventory
            .register_units(&[
                testutil::new_unit("BL-1", "LIVQUIK", "class4", "B1"),
                testutil::new_unit("BL-2", "LIVQUIK", "class4", "B1"),
            ])
            .await
            .unwrap();
        sales
            .bulk_mark_sold(&["BL-1".to_string()], Some(7))
            .await
            .unwrap();

        // No mapping columns anywhere: the mapping precondition is skipped.
        sales.correct_sale("BL-1", "BL-2", None).await.unwrap();

        let correct = inventory.get_by_serial("BL-2").await.unwrap().unwrap();
        assert_eq!(correct.status, UnitStatus::Sold);
        assert_eq!(
            sales.latest_sale("BL-2").await.unwrap().unwrap().sold_by_user_id,
            Some(7)
        );
    }

    #[tokio::test]
    async fn test_revoke_missing_sale_record() {
        let db = testutil::test_db().await;
        testutil::seed_units(&db, &["NR-1"], "LIVQUIK", "class4", "B1").await;

        let err = db.sales().revoke_sale("NR-1", None).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err = db
            .sales()
            .revoke_sale("NR-1", Some(UnitStatus::Sold))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }
}
