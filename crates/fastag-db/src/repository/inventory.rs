//! # Inventory Unit Repository
//!
//! The authoritative store of FASTag units and their status.
//!
//! ## Status Transitions Owned Here vs Elsewhere
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  intake (this module)          in_stock                                 │
//! │  transfer (transfer.rs)        in_stock ⇄ assigned, assigned → assigned │
//! │  sale (sales.rs)               in_stock|assigned → sold                 │
//! │  revoke/correct (sales.rs)     sold → in_stock                          │
//! │  deactivate (this module)      in_stock|assigned → deactivated          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Optional Columns
//! Every SELECT built here goes through [`unit_select`], which aliases
//! columns the probed schema does not carry to NULL (and derives
//! `bank_mapping_status` from the legacy `mapping_done` boolean where that is
//! all the deployment has). Row decoding therefore never depends on the
//! schema vintage.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::schema::SchemaCapabilities;
use fastag_core::validation::{validate_serial, validate_serials};
use fastag_core::{
    AvailableUnitsFilter, BankMappingStatus, FastagUnit, NewUnit, OwnerRef, UnitStatus,
    ValidationError, DEFAULT_AVAILABLE_UNITS_LIMIT, MAX_AVAILABLE_UNITS_LIMIT,
    OPEN_TICKET_STATUSES,
};

/// Builds the full unit SELECT prologue for the probed schema.
///
/// Absent optional columns are aliased to NULL so [`FastagUnit`] decodes
/// identically against every schema vintage.
pub(crate) fn unit_select(caps: &SchemaCapabilities) -> String {
    let mapping = if caps.has_bank_mapping_status() {
        "bank_mapping_status"
    } else if caps.has_legacy_mapping_done() {
        "CASE WHEN mapping_done = 1 THEN 'done' ELSE 'pending' END AS bank_mapping_status"
    } else {
        "NULL AS bank_mapping_status"
    };
    let login = if caps.has_bank_login_user_id() {
        "bank_login_user_id"
    } else {
        "NULL AS bank_login_user_id"
    };
    let seller = if caps.has_unit_sold_by_user_id() {
        "sold_by_user_id"
    } else {
        "NULL AS sold_by_user_id"
    };

    format!(
        "SELECT id, tag_serial, bank_name, fastag_class, batch_number, supplier_id, \
         purchase_price, purchase_date, purchase_type, status, assigned_to_agent_id, \
         assigned_to, assigned_date, assigned_at, {mapping}, {login}, {seller}, \
         created_at, updated_at FROM fastags"
    )
}

/// SQL fragment excluding units referenced by an open ticket.
///
/// Statuses are compile-time constants, inlined as literals.
pub(crate) fn no_open_ticket_clause() -> String {
    let statuses = OPEN_TICKET_STATUSES
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "NOT EXISTS (SELECT 1 FROM tickets WHERE tickets.fastag_serial = fastags.tag_serial \
         AND tickets.status IN ({statuses}))"
    )
}

/// Fetches one unit by serial through any executor (pool or open
/// transaction). Engines that mutate state use this for their pre-mutation
/// snapshot reads.
pub(crate) async fn fetch_unit<'e, E>(
    executor: E,
    caps: &SchemaCapabilities,
    serial: &str,
) -> DbResult<Option<FastagUnit>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE tag_serial = ?1", unit_select(caps));
    let unit = sqlx::query_as::<_, FastagUnit>(&sql)
        .bind(serial)
        .fetch_optional(executor)
        .await?;
    Ok(unit)
}

/// Repository for inventory unit operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
    caps: Arc<SchemaCapabilities>,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool, caps: Arc<SchemaCapabilities>) -> Self {
        InventoryRepository { pool, caps }
    }

    /// Gets a unit by its serial.
    pub async fn get_by_serial(&self, serial: &str) -> DbResult<Option<FastagUnit>> {
        fetch_unit(&self.pool, &self.caps, serial).await
    }

    /// Registers newly purchased units into warehouse stock.
    ///
    /// All inserts run in one transaction: a duplicate serial anywhere in the
    /// batch leaves nothing behind.
    pub async fn register_units(&self, units: &[NewUnit]) -> DbResult<u64> {
        if units.is_empty() {
            return Err(ValidationError::required("units").into());
        }
        for unit in units {
            validate_serial(&unit.tag_serial)?;
            if unit.bank_name.trim().is_empty() {
                return Err(ValidationError::required("bank_name").into());
            }
            if unit.fastag_class.trim().is_empty() {
                return Err(ValidationError::required("fastag_class").into());
            }
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for unit in units {
            sqlx::query(
                "INSERT INTO fastags (tag_serial, bank_name, fastag_class, batch_number, \
                 supplier_id, purchase_price, purchase_date, purchase_type, status, \
                 created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .bind(unit.tag_serial.trim())
            .bind(&unit.bank_name)
            .bind(&unit.fastag_class)
            .bind(&unit.batch_number)
            .bind(unit.supplier_id)
            .bind(unit.purchase_price)
            .bind(unit.purchase_date)
            .bind(unit.purchase_type)
            .bind(UnitStatus::InStock)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(count = units.len(), "Units registered into stock");
        Ok(units.len() as u64)
    }

    /// Lists units available for transfer or sale.
    ///
    /// ## Matching Rules
    /// - Bank matches the whole alias group (QUIKWALLET finds LIVQUIK stock)
    /// - Units referenced by an open ticket are NEVER returned, whatever
    ///   their status or owner
    /// - Results are ordered by serial ascending, capped at
    ///   [`MAX_AVAILABLE_UNITS_LIMIT`]
    pub async fn list_available(&self, filter: &AvailableUnitsFilter) -> DbResult<Vec<FastagUnit>> {
        if filter.bank_name.trim().is_empty() {
            return Err(ValidationError::required("bank_name").into());
        }
        if filter.fastag_class.trim().is_empty() {
            return Err(ValidationError::required("fastag_class").into());
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_AVAILABLE_UNITS_LIMIT)
            .clamp(1, MAX_AVAILABLE_UNITS_LIMIT);
        let variants = fastag_core::bank::bank_name_variants(&filter.bank_name);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(unit_select(&self.caps));
        qb.push(" WHERE status IN ('in_stock', 'assigned')");

        qb.push(" AND UPPER(bank_name) IN (");
        {
            let mut separated = qb.separated(", ");
            for variant in &variants {
                separated.push_bind(variant.clone());
            }
        }
        qb.push(")");

        qb.push(" AND fastag_class = ");
        qb.push_bind(filter.fastag_class.clone());

        if let Some(supplier_id) = filter.supplier_id {
            qb.push(" AND supplier_id = ");
            qb.push_bind(supplier_id);
        }

        match filter.owner {
            Some(OwnerRef::Admin) => {
                qb.push(" AND status = 'in_stock' AND assigned_to_agent_id IS NULL");
            }
            Some(OwnerRef::Agent(agent_id)) => {
                qb.push(" AND status = 'assigned' AND assigned_to_agent_id = ");
                qb.push_bind(agent_id);
            }
            None => {}
        }

        if let Some(mapping) = filter.mapping_status {
            if self.caps.has_bank_mapping_status() {
                qb.push(" AND bank_mapping_status = ");
                qb.push_bind(mapping.as_str());
            } else if self.caps.has_legacy_mapping_done() {
                qb.push(" AND mapping_done = ");
                qb.push_bind((mapping == BankMappingStatus::Done) as i64);
            } else {
                // Narrow schema cannot express the filter; ignore it rather
                // than silently returning nothing.
                warn!("mapping_status filter ignored: schema does not track mapping");
            }
        }

        if let Some(fragment) = filter
            .serial_contains
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            qb.push(" AND tag_serial LIKE ");
            qb.push_bind(format!("%{fragment}%"));
        }

        qb.push(" AND ");
        qb.push(no_open_ticket_clause());

        qb.push(" ORDER BY tag_serial ASC LIMIT ");
        qb.push_bind(limit as i64);

        let units = qb
            .build_query_as::<FastagUnit>()
            .fetch_all(&self.pool)
            .await?;

        debug!(
            bank = %filter.bank_name,
            class = %filter.fastag_class,
            count = units.len(),
            "Available units listed"
        );
        Ok(units)
    }

    /// Updates the bank-mapping sub-state of the given serials.
    ///
    /// Degrades per the probed schema: writes `bank_mapping_status` when
    /// present, falls back to the legacy `mapping_done` boolean, and becomes
    /// a logged no-op on schemas that track neither.
    pub async fn update_mapping_status(
        &self,
        serials: &[String],
        status: BankMappingStatus,
        bank_login_user_id: Option<i64>,
    ) -> DbResult<u64> {
        validate_serials(serials)?;

        if !self.caps.tracks_mapping() {
            warn!("update_mapping_status skipped: schema does not track mapping");
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE fastags SET ");
        if self.caps.has_bank_mapping_status() {
            qb.push("bank_mapping_status = ");
            qb.push_bind(status.as_str());
        } else {
            qb.push("mapping_done = ");
            qb.push_bind((status == BankMappingStatus::Done) as i64);
        }
        if let Some(login_user) = bank_login_user_id {
            if self.caps.has_bank_login_user_id() {
                qb.push(", bank_login_user_id = ");
                qb.push_bind(login_user);
            }
        }
        qb.push(", updated_at = ");
        qb.push_bind(Utc::now());

        qb.push(" WHERE tag_serial IN (");
        {
            let mut separated = qb.separated(", ");
            for serial in serials {
                separated.push_bind(serial.clone());
            }
        }
        qb.push(")");

        let result = qb.build().execute(&self.pool).await?;

        debug!(
            count = result.rows_affected(),
            status = %status,
            "Mapping status updated"
        );
        Ok(result.rows_affected())
    }

    /// Deactivates a unit (terminal non-sale end state).
    ///
    /// Sold units are refused: revoke the sale first so the ledger stays
    /// consistent.
    pub async fn deactivate(&self, serial: &str) -> DbResult<()> {
        validate_serial(serial)?;

        let mut tx = self.pool.begin().await?;

        let unit = fetch_unit(&mut *tx, &self.caps, serial)
            .await?
            .ok_or_else(|| DbError::not_found("FASTag", serial))?;

        if unit.status == UnitStatus::Sold {
            return Err(DbError::AlreadySold {
                serial: serial.to_string(),
            });
        }

        sqlx::query(
            "UPDATE fastags SET status = ?1, assigned_to_agent_id = NULL, assigned_to = NULL, \
             updated_at = ?2 WHERE id = ?3 AND status != 'sold'",
        )
        .bind(UnitStatus::Deactivated)
        .bind(Utc::now())
        .bind(unit.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(serial = %serial, "Unit deactivated");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
