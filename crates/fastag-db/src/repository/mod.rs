//! # Engine Repositories
//!
//! One repository per engine, all following the same pattern:
//! - Hold a pool handle plus the probed schema capabilities
//! - Validate inputs BEFORE the first storage statement
//! - Wrap every compound mutation in a transaction; commit on success,
//!   rollback-on-drop on any error path

pub mod backfill;
pub mod hierarchy;
pub mod inventory;
pub mod reference;
pub mod sales;
pub mod transfer;
