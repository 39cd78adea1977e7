//! # fastag-core: Pure Business Logic for Fastag ERP
//!
//! This crate is the **heart** of the inventory and attribution engine. It
//! contains the domain rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fastag ERP Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 API / Dashboard layer (external)                │   │
//! │  │   transfer endpoints, sale correction UI, agent reports         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fastag-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ hierarchy │  │   bank    │  │ validation│  │   │
//! │  │   │ UnitStatus│  │  rollups  │  │  aliases  │  │   rules   │  │   │
//! │  │   │ OwnerRef  │  │ tree math │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  fastag-db (Database Layer)                     │   │
//! │  │        SQLite queries, migrations, engine repositories          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (FastagUnit, SaleRecord, OwnerRef, etc.)
//! - [`hierarchy`] - Agent tree assembly and count rollups
//! - [`bank`] - Issuing-bank alias resolution
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bank;
pub mod error;
pub mod hierarchy;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use fastag_core::OwnerRef` instead of
// `use fastag_core::types::OwnerRef`

pub use error::{ValidationError, ValidationResult};
pub use hierarchy::{AgentCounts, HierarchyNode};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default row cap for the available-units query when the caller does not
/// supply one.
pub const DEFAULT_AVAILABLE_UNITS_LIMIT: u32 = 100;

/// Hard row cap for the available-units query. Caller-supplied limits above
/// this are clamped.
pub const MAX_AVAILABLE_UNITS_LIMIT: u32 = 5000;

/// Ticket statuses that make a unit ineligible for transfer or sale while a
/// case referencing its serial is in flight.
pub const OPEN_TICKET_STATUSES: &[&str] = &["open", "in_progress", "activation_pending"];

/// Ticket statuses the ledger backfill treats as a completed sale.
pub const SETTLED_TICKET_STATUSES: &[&str] = &["done", "closed"];
