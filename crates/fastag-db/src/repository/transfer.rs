//! # Transfer/Assignment Engine
//!
//! Ownership changes between the warehouse ("admin") and agents, with an
//! append-only audit trail.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Transfer Operations                                │
//! │                                                                         │
//! │  transfer(from, to, class, batch)                                      │
//! │    └── moves EVERY eligible unit in the class+batch scope              │
//! │        eligible = owned by `from`, right status, no open ticket        │
//! │                                                                         │
//! │  bulk_transfer([{from, to, serials[]}, ...])                           │
//! │    └── explicit serial lists, many entries in ONE transaction          │
//! │        validation of every entry runs BEFORE the first write;          │
//! │        any entry matching zero units rolls the whole batch back        │
//! │                                                                         │
//! │  Both write one audit row per transferred serial.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::inventory::no_open_ticket_clause;
use crate::schema::SchemaCapabilities;
use fastag_core::validation::{validate_serial, validate_transfer_request, validate_transfer_scope};
use fastag_core::{
    BankMappingStatus, BulkTransferAssignment, BulkTransferOutcome, OwnerRef, TransferOutcome,
    TransferRecord, TransferRequest, ValidationError,
};

/// Classification fields snapshotted onto each audit row.
#[derive(Debug, sqlx::FromRow)]
struct EligibleUnit {
    tag_serial: String,
    bank_name: String,
    fastag_class: String,
    batch_number: Option<String>,
}

/// Repository for transfer operations and the audit trail.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
    caps: Arc<SchemaCapabilities>,
}

impl TransferRepository {
    /// Creates a new TransferRepository.
    pub fn new(pool: SqlitePool, caps: Arc<SchemaCapabilities>) -> Self {
        TransferRepository { pool, caps }
    }

    /// Moves every eligible unit in a class+batch scope between two owners.
    ///
    /// ## Arguments
    /// * `from_owner` / `to_owner` - "admin" or a numeric agent id
    /// * `fastag_class` / `batch_number` - the transfer scope
    /// * `mapping_hint` - optionally stamp the bank-mapping sub-state in the
    ///   same statement (skipped when the schema does not track mapping)
    ///
    /// ## Errors
    /// * `Validation` - a scope field is missing or an owner is malformed
    /// * `NoMatchingUnits` - the eligible set is empty
    pub async fn transfer(
        &self,
        from_owner: &str,
        to_owner: &str,
        fastag_class: &str,
        batch_number: &str,
        mapping_hint: Option<BankMappingStatus>,
    ) -> DbResult<TransferOutcome> {
        validate_transfer_scope(fastag_class, batch_number)?;
        let from = OwnerRef::parse_field("from_owner", from_owner)?;
        let to = OwnerRef::parse_field("to_owner", to_owner)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Eligible set, selected before mutation so audit rows can snapshot
        // the classification fields.
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT tag_serial, bank_name, fastag_class, batch_number FROM fastags \
             WHERE fastag_class = ",
        );
        qb.push_bind(fastag_class.to_string());
        qb.push(" AND batch_number = ");
        qb.push_bind(batch_number.to_string());
        push_owner_guard(&mut qb, from);
        qb.push(" AND ");
        qb.push(no_open_ticket_clause());
        qb.push(" ORDER BY tag_serial ASC");

        let eligible: Vec<EligibleUnit> = qb
            .build_query_as::<EligibleUnit>()
            .fetch_all(&mut *tx)
            .await?;

        if eligible.is_empty() {
            return Err(DbError::NoMatchingUnits);
        }

        let serials: Vec<String> = eligible.iter().map(|u| u.tag_serial.clone()).collect();
        apply_owner_update(&mut tx, &self.caps, &serials, to, mapping_hint, now).await?;

        for unit in &eligible {
            log_transfer(&mut tx, unit, from, to, None, now).await?;
        }

        tx.commit().await?;

        info!(
            from = %from,
            to = %to,
            class = %fastag_class,
            batch = %batch_number,
            count = serials.len(),
            "Transfer completed"
        );
        Ok(TransferOutcome {
            transferred_serials: serials,
        })
    }

    /// Applies a batch of serial-scoped transfer requests in one transaction.
    ///
    /// Every entry is validated before any write. An entry whose serial list
    /// matches zero eligible units fails the whole batch: either all entries
    /// land or none do.
    pub async fn bulk_transfer(
        &self,
        requests: &[TransferRequest],
    ) -> DbResult<BulkTransferOutcome> {
        if requests.is_empty() {
            return Err(ValidationError::required("requests").into());
        }

        // Validation pass first: no writes happen for a malformed batch.
        let mut endpoints = Vec::with_capacity(requests.len());
        for request in requests {
            endpoints.push(validate_transfer_request(request)?);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut assignments = Vec::with_capacity(requests.len());

        for (request, (from, to)) in requests.iter().zip(endpoints) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT tag_serial, bank_name, fastag_class, batch_number FROM fastags \
                 WHERE tag_serial IN (",
            );
            {
                let mut separated = qb.separated(", ");
                for serial in &request.tag_serials {
                    separated.push_bind(serial.clone());
                }
            }
            qb.push(")");
            push_owner_guard(&mut qb, from);
            qb.push(" AND ");
            qb.push(no_open_ticket_clause());
            qb.push(" ORDER BY tag_serial ASC");

            let eligible: Vec<EligibleUnit> = qb
                .build_query_as::<EligibleUnit>()
                .fetch_all(&mut *tx)
                .await?;

            if eligible.is_empty() {
                // Rolls back earlier entries: the batch is all-or-nothing.
                return Err(DbError::NoMatchingUnits);
            }

            let serials: Vec<String> = eligible.iter().map(|u| u.tag_serial.clone()).collect();
            apply_owner_update(&mut tx, &self.caps, &serials, to, None, now).await?;

            for unit in &eligible {
                log_transfer(&mut tx, unit, from, to, request.note.as_deref(), now).await?;
            }

            debug!(from = %from, to = %to, count = serials.len(), "Bulk transfer entry applied");
            assignments.push(BulkTransferAssignment {
                from_owner: from,
                to_owner: to,
                tag_serials: serials,
            });
        }

        tx.commit().await?;

        info!(
            entries = assignments.len(),
            total = assignments.iter().map(|a| a.tag_serials.len()).sum::<usize>(),
            "Bulk transfer completed"
        );
        Ok(BulkTransferOutcome {
            assigned_units: assignments,
        })
    }

    /// The audit trail for one serial, newest first.
    pub async fn history_for_serial(&self, serial: &str) -> DbResult<Vec<TransferRecord>> {
        validate_serial(serial)?;

        let records = sqlx::query_as::<_, TransferRecord>(
            "SELECT id, tag_serial, from_role, from_user_id, to_role, to_user_id, bank_name, \
             fastag_class, batch_number, note, created_at FROM fastag_transfers \
             WHERE tag_serial = ?1 ORDER BY created_at DESC, id DESC",
        )
        .bind(serial)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// Appends the eligibility predicate for the from-owner: warehouse stock for
/// admin, that agent's assigned units otherwise.
fn push_owner_guard(qb: &mut QueryBuilder<'_, Sqlite>, from: OwnerRef) {
    match from {
        OwnerRef::Admin => {
            qb.push(" AND status = 'in_stock' AND assigned_to_agent_id IS NULL");
        }
        OwnerRef::Agent(agent_id) => {
            qb.push(" AND status = 'assigned' AND assigned_to_agent_id = ");
            qb.push_bind(agent_id);
        }
    }
}

/// One batch UPDATE moving `serials` to the new owner.
async fn apply_owner_update(
    tx: &mut Transaction<'_, Sqlite>,
    caps: &SchemaCapabilities,
    serials: &[String],
    to: OwnerRef,
    mapping_hint: Option<BankMappingStatus>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE fastags SET ");

    match to {
        OwnerRef::Admin => {
            qb.push(
                "status = 'in_stock', assigned_to_agent_id = NULL, assigned_to = NULL, \
                 assigned_date = NULL, assigned_at = NULL",
            );
        }
        OwnerRef::Agent(agent_id) => {
            qb.push("status = 'assigned', assigned_to_agent_id = ");
            qb.push_bind(agent_id);
            qb.push(", assigned_to = NULL, assigned_date = ");
            qb.push_bind(now.date_naive());
            qb.push(", assigned_at = ");
            qb.push_bind(now);
        }
    }

    if let Some(mapping) = mapping_hint {
        if caps.has_bank_mapping_status() {
            qb.push(", bank_mapping_status = ");
            qb.push_bind(mapping.as_str());
        } else if caps.has_legacy_mapping_done() {
            qb.push(", mapping_done = ");
            qb.push_bind((mapping == BankMappingStatus::Done) as i64);
        } else {
            warn!("mapping hint ignored: schema does not track mapping");
        }
    }

    qb.push(", updated_at = ");
    qb.push_bind(now);

    qb.push(" WHERE tag_serial IN (");
    {
        let mut separated = qb.separated(", ");
        for serial in serials {
            separated.push_bind(serial.clone());
        }
    }
    qb.push(")");

    qb.build().execute(&mut **tx).await?;
    Ok(())
}

/// Appends one audit row. Part of the transfer transaction: the trail never
/// disagrees with the unit table.
async fn log_transfer(
    tx: &mut Transaction<'_, Sqlite>,
    unit: &EligibleUnit,
    from: OwnerRef,
    to: OwnerRef,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO fastag_transfers (id, tag_serial, from_role, from_user_id, to_role, \
         to_user_id, bank_name, fastag_class, batch_number, note, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&unit.tag_serial)
    .bind(from.role_label())
    .bind(from.agent_id())
    .bind(to.role_label())
    .bind(to.agent_id())
    .bind(&unit.bank_name)
    .bind(&unit.fastag_class)
    .bind(&unit.batch_number)
    .bind(note)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
