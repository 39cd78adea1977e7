//! Shared helpers for the colocated repository tests: in-memory databases in
//! every supported schema vintage, plus seeding shortcuts.

use std::sync::Arc;

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::pool::{Database, DbConfig};
use crate::schema::SchemaCapabilities;
use fastag_core::NewUnit;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fully migrated in-memory database.
pub(crate) async fn test_db() -> Database {
    init_tracing();
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

/// Bare pool over the migrated schema (no Database wrapper).
pub(crate) async fn migrated_pool() -> SqlitePool {
    test_db().await.pool().clone()
}

/// Pool over a database with no tables at all.
pub(crate) async fn empty_pool() -> SqlitePool {
    init_tracing();
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool")
}

const LEGACY_COMMON_TABLES: &str = "
    CREATE TABLE fastag_sales (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        tag_serial         TEXT    NOT NULL,
        ticket_id          INTEGER,
        vehicle_reg_no     TEXT,
        bank_name          TEXT,
        fastag_class       TEXT,
        supplier_id        INTEGER,
        sold_by_user_id    INTEGER,
        sold_by_agent_id   INTEGER,
        payment_to_collect INTEGER,
        payment_to_send    INTEGER,
        net_value          INTEGER,
        commission_amount  INTEGER,
        created_at         TEXT    NOT NULL
    );
    CREATE TABLE users (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        name           TEXT    NOT NULL,
        role           TEXT    NOT NULL,
        parent_user_id INTEGER
    );
    CREATE TABLE tickets (
        id                         INTEGER PRIMARY KEY AUTOINCREMENT,
        fastag_serial              TEXT,
        status                     TEXT NOT NULL,
        vehicle_reg_no             TEXT,
        lead_received_from_user_id INTEGER,
        payment_to_collect         INTEGER,
        payment_to_send            INTEGER,
        net_value                  INTEGER,
        commission_amount          INTEGER,
        created_at                 TEXT NOT NULL
    );
    CREATE TABLE fastag_transfers (
        id           TEXT PRIMARY KEY,
        tag_serial   TEXT NOT NULL,
        from_role    TEXT NOT NULL,
        from_user_id INTEGER,
        to_role      TEXT NOT NULL,
        to_user_id   INTEGER,
        bank_name    TEXT,
        fastag_class TEXT,
        batch_number TEXT,
        note         TEXT,
        created_at   TEXT NOT NULL
    );
    CREATE TABLE banks (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT    NOT NULL UNIQUE
    );
";

/// The unit table as the oldest deployments carry it: no mapping columns, no
/// seller mirror.
const BARE_LEGACY_FASTAGS: &str = "
    CREATE TABLE fastags (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        tag_serial           TEXT    NOT NULL UNIQUE,
        bank_name            TEXT    NOT NULL,
        fastag_class         TEXT    NOT NULL,
        batch_number         TEXT,
        supplier_id          INTEGER,
        purchase_price       INTEGER,
        purchase_date        TEXT,
        purchase_type        TEXT,
        status               TEXT    NOT NULL DEFAULT 'in_stock',
        assigned_to_agent_id INTEGER,
        assigned_to          INTEGER,
        assigned_date        TEXT,
        assigned_at          TEXT,
        created_at           TEXT    NOT NULL,
        updated_at           TEXT    NOT NULL
    );
";

/// Transitional vintage: tracks mapping through the `mapping_done` boolean.
const MAPPING_DONE_FASTAGS: &str = "
    CREATE TABLE fastags (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        tag_serial           TEXT    NOT NULL UNIQUE,
        bank_name            TEXT    NOT NULL,
        fastag_class         TEXT    NOT NULL,
        batch_number         TEXT,
        supplier_id          INTEGER,
        purchase_price       INTEGER,
        purchase_date        TEXT,
        purchase_type        TEXT,
        status               TEXT    NOT NULL DEFAULT 'in_stock',
        assigned_to_agent_id INTEGER,
        assigned_to          INTEGER,
        assigned_date        TEXT,
        assigned_at          TEXT,
        mapping_done         INTEGER NOT NULL DEFAULT 0,
        created_at           TEXT    NOT NULL,
        updated_at           TEXT    NOT NULL
    );
";

async fn legacy_pool_with(fastags_ddl: &str) -> SqlitePool {
    let pool = empty_pool().await;
    for statement in fastags_ddl
        .split(';')
        .chain(LEGACY_COMMON_TABLES.split(';'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        sqlx::query(statement).execute(&pool).await.expect("legacy DDL");
    }
    pool
}

/// Pool over the oldest schema vintage.
pub(crate) async fn legacy_pool() -> SqlitePool {
    legacy_pool_with(BARE_LEGACY_FASTAGS).await
}

/// Oldest schema vintage plus its probed capabilities.
pub(crate) async fn bare_legacy_pool() -> (SqlitePool, Arc<SchemaCapabilities>) {
    let pool = legacy_pool().await;
    let caps = Arc::new(SchemaCapabilities::detect(&pool).await);
    (pool, caps)
}

/// Transitional `mapping_done` vintage plus its probed capabilities.
pub(crate) async fn legacy_mapping_done_pool() -> (SqlitePool, Arc<SchemaCapabilities>) {
    let pool = legacy_pool_with(MAPPING_DONE_FASTAGS).await;
    let caps = Arc::new(SchemaCapabilities::detect(&pool).await);
    (pool, caps)
}

// =============================================================================
// Seeding Helpers
// =============================================================================

pub(crate) fn new_unit(serial: &str, bank: &str, class: &str, batch: &str) -> NewUnit {
    NewUnit {
        tag_serial: serial.to_string(),
        bank_name: bank.to_string(),
        fastag_class: class.to_string(),
        batch_number: Some(batch.to_string()),
        supplier_id: Some(1),
        purchase_price: Some(10_000),
        purchase_date: None,
        purchase_type: None,
    }
}

/// Registers units into warehouse stock through the inventory engine.
pub(crate) async fn seed_units(db: &Database, serials: &[&str], bank: &str, class: &str, batch: &str) {
    let units: Vec<NewUnit> = serials
        .iter()
        .map(|serial| new_unit(serial, bank, class, batch))
        .collect();
    db.inventory()
        .register_units(&units)
        .await
        .expect("seed units");
}

/// Inserts a ticket row. Settled tickets carry fixed financials
/// (50_000 / 40_000 / 10_000 / 2_500 paise) so backfill tests can assert the
/// carry-over.
pub(crate) async fn seed_ticket(db: &Database, serial: &str, status: &str, seller: Option<i64>) -> i64 {
    let result = sqlx::query(
        "INSERT INTO tickets (fastag_serial, status, vehicle_reg_no, \
         lead_received_from_user_id, payment_to_collect, payment_to_send, net_value, \
         commission_amount, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(serial)
    .bind(status)
    .bind("MH12AB1234")
    .bind(seller)
    .bind(50_000_i64)
    .bind(40_000_i64)
    .bind(10_000_i64)
    .bind(2_500_i64)
    .bind(Utc::now())
    .execute(db.pool())
    .await
    .expect("seed ticket");
    result.last_insert_rowid()
}

/// Inserts a raw ledger row (simulating legacy or backfilled data).
pub(crate) async fn seed_sale_row(
    db: &Database,
    serial: &str,
    seller: Option<i64>,
    ticket_id: Option<i64>,
) {
    seed_sale_row_full(db, serial, seller, None, ticket_id).await;
}

/// Raw ledger row with independent user and agent attribution.
pub(crate) async fn seed_sale_row_full(
    db: &Database,
    serial: &str,
    sold_by_user_id: Option<i64>,
    sold_by_agent_id: Option<i64>,
    ticket_id: Option<i64>,
) {
    sqlx::query(
        "INSERT INTO fastag_sales (tag_serial, ticket_id, sold_by_user_id, sold_by_agent_id, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(serial)
    .bind(ticket_id)
    .bind(sold_by_user_id)
    .bind(sold_by_agent_id)
    .bind(Utc::now())
    .execute(db.pool())
    .await
    .expect("seed sale row");
}

/// Forces a unit into sold state directly (simulating pre-ledger data).
pub(crate) async fn force_unit_sold(db: &Database, serial: &str, seller: Option<i64>) {
    sqlx::query(
        "UPDATE fastags SET status = 'sold', assigned_to_agent_id = NULL, assigned_to = NULL, \
         sold_by_user_id = ?1, updated_at = ?2 WHERE tag_serial = ?3",
    )
    .bind(seller)
    .bind(Utc::now())
    .bind(serial)
    .execute(db.pool())
    .await
    .expect("force unit sold");
}

/// Inserts a hierarchy node with an explicit id.
pub(crate) async fn seed_user(db: &Database, id: i64, name: &str, role: &str, parent: Option<i64>) {
    sqlx::query("INSERT INTO users (id, name, role, parent_user_id) VALUES (?1, ?2, ?3, ?4)")
        .bind(id)
        .bind(name)
        .bind(role)
        .bind(parent)
        .execute(db.pool())
        .await
        .expect("seed user");
}
