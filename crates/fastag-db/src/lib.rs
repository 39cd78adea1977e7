//! # fastag-db: Database Layer for Fastag ERP
//!
//! SQLite-backed persistence for the inventory lifecycle and attribution
//! engine: the unit status machine, the sales ledger with correction and
//! revocation, bulk transfers with audit trail, agent hierarchy rollups, and
//! the ledger backfill job.
//!
//! ## Quick Start
//! ```rust,ignore
//! use fastag_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./fastag.db")).await?;
//!
//! // Move every eligible class4/B1 unit from the warehouse to agent 7.
//! let outcome = db.transfers().transfer("admin", "7", "class4", "B1", None).await?;
//!
//! // Mark a unit sold, then roll the counts up the agent tree.
//! db.sales().bulk_mark_sold(&["608268-001-0046785".into()], Some(7)).await?;
//! let tree = db.hierarchy().get_agent_hierarchy(1).await?;
//! ```
//!
//! ## Concurrency Model
//! Requests are handled independently on pooled connections. Compound
//! mutations (bulk transfer, mark-sold, revoke, correct, backfill) each run
//! in ONE transaction; conflicting transitions on the same serial are
//! serialized by status-guarded UPDATEs checked via rows_affected. Unit
//! state is never cached in-process.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod schema;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::backfill::BackfillRepository;
pub use repository::hierarchy::HierarchyRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::reference::BankDirectory;
pub use repository::sales::SalesRepository;
pub use repository::transfer::TransferRepository;
pub use schema::SchemaCapabilities;

#[cfg(test)]
pub(crate) mod testutil;
