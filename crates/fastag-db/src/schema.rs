//! # Schema Capability Probe
//!
//! The engine runs against more than one vintage of the production schema:
//! older deployments predate the bank-mapping columns and the best-effort
//! seller mirror on `fastags`. Rather than branching ad hoc inside every
//! query, the probe resolves a [`SchemaCapabilities`] value object once at
//! startup and every engine consults it before referencing an optional
//! column.
//!
//! ## Probe Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Capability Resolution                               │
//! │                                                                         │
//! │  Database::new()                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SchemaCapabilities::detect(pool)  ← one PRAGMA per probed table       │
//! │       │                                                                 │
//! │       ├── probe succeeds  → column set recorded                        │
//! │       └── probe fails     → table contributes nothing                  │
//! │                             (every column reads as ABSENT)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Arc<SchemaCapabilities> shared by all repositories                    │
//! │  (memoized for the process lifetime; schema never changes at runtime) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A probe failure is never surfaced to the caller: the engine degrades to
//! the narrower schema instead. Engines can be unit-tested against both
//! permutations by constructing the value object by hand ([`modern`] /
//! [`legacy`]).
//!
//! [`modern`]: SchemaCapabilities::modern
//! [`legacy`]: SchemaCapabilities::legacy

use std::collections::HashSet;

use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Tables whose column sets are probed at startup.
const PROBED_TABLES: &[&str] = &["fastags", "fastag_sales", "users", "tickets"];

/// Optional columns a fully current schema carries. Used by
/// [`SchemaCapabilities::modern`] for tests.
const MODERN_OPTIONAL_COLUMNS: &[(&str, &str)] = &[
    ("fastags", "bank_mapping_status"),
    ("fastags", "bank_login_user_id"),
    ("fastags", "sold_by_user_id"),
    ("fastag_sales", "sold_by_agent_id"),
];

/// The set of columns actually present in the connected schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaCapabilities {
    columns: HashSet<(String, String)>,
}

impl SchemaCapabilities {
    /// Probes the connected database for the column sets of the engine's
    /// tables. Any probe failure is logged and treated as "columns absent".
    pub async fn detect(pool: &SqlitePool) -> Self {
        let mut columns = HashSet::new();

        for table in PROBED_TABLES {
            let probed: Result<Vec<String>, sqlx::Error> =
                sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
                    .bind(table)
                    .fetch_all(pool)
                    .await;

            match probed {
                Ok(names) => {
                    for name in names {
                        columns.insert((table.to_string(), name));
                    }
                }
                Err(err) => {
                    warn!(table = %table, error = %err, "Column probe failed, treating columns as absent");
                }
            }
        }

        let caps = SchemaCapabilities { columns };
        debug!(
            mapping_status = caps.has_bank_mapping_status(),
            legacy_mapping_done = caps.has_legacy_mapping_done(),
            unit_seller_mirror = caps.has_unit_sold_by_user_id(),
            "Schema capabilities resolved"
        );
        caps
    }

    /// Whether `table.column` exists in the connected schema.
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns
            .contains(&(table.to_string(), column.to_string()))
    }

    /// Capabilities of a fully current schema (all optional columns present).
    /// For tests and offline construction.
    pub fn modern() -> Self {
        Self::with_columns(MODERN_OPTIONAL_COLUMNS)
    }

    /// Capabilities of the narrowest legacy schema (no optional columns).
    /// For tests and offline construction.
    pub fn legacy() -> Self {
        SchemaCapabilities::default()
    }

    /// Builds a capability set from an explicit column list.
    pub fn with_columns(columns: &[(&str, &str)]) -> Self {
        SchemaCapabilities {
            columns: columns
                .iter()
                .map(|(t, c)| (t.to_string(), c.to_string()))
                .collect(),
        }
    }

    // -------------------------------------------------------------------------
    // Named accessors for the optional columns the engines branch on
    // -------------------------------------------------------------------------

    pub fn has_bank_mapping_status(&self) -> bool {
        self.has_column("fastags", "bank_mapping_status")
    }

    /// Legacy boolean predecessor of `bank_mapping_status`.
    pub fn has_legacy_mapping_done(&self) -> bool {
        self.has_column("fastags", "mapping_done")
    }

    /// Whether mapping state is representable at all in this schema.
    pub fn tracks_mapping(&self) -> bool {
        self.has_bank_mapping_status() || self.has_legacy_mapping_done()
    }

    pub fn has_bank_login_user_id(&self) -> bool {
        self.has_column("fastags", "bank_login_user_id")
    }

    pub fn has_unit_sold_by_user_id(&self) -> bool {
        self.has_column("fastags", "sold_by_user_id")
    }

    pub fn has_ledger_sold_by_agent_id(&self) -> bool {
        self.has_column("fastag_sales", "sold_by_agent_id")
    }
}
