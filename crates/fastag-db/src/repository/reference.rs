//! # Bank Reference Directory
//!
//! Read-through cache over the `banks` dimension table.
//!
//! The bank list is the only thing this layer ever caches: it is static
//! reference data joined for display. Unit status is ALWAYS read fresh -
//! caching it would break the consistency guarantees of the inventory
//! engines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::DbResult;
use fastag_core::{Bank, ValidationError};

#[derive(Debug)]
struct CacheEntry {
    fetched_at: Instant,
    banks: Vec<Bank>,
}

/// TTL-cached directory of issuing banks.
#[derive(Debug, Clone)]
pub struct BankDirectory {
    pool: SqlitePool,
    ttl: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
}

impl BankDirectory {
    /// Creates a new BankDirectory with the given cache TTL.
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        BankDirectory {
            pool,
            ttl,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Lists all banks, name-ordered. Served from cache within the TTL.
    pub async fn list_banks(&self) -> DbResult<Vec<Bank>> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.banks.clone());
                }
            }
        }

        let banks = sqlx::query_as::<_, Bank>("SELECT id, name FROM banks ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        debug!(count = banks.len(), "Bank list refreshed");
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            fetched_at: Instant::now(),
            banks: banks.clone(),
        });

        Ok(banks)
    }

    /// Adds a bank and invalidates the cache.
    pub async fn create_bank(&self, name: &str) -> DbResult<Bank> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::required("name").into());
        }

        let result = sqlx::query("INSERT INTO banks (name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        self.invalidate().await;

        Ok(Bank {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// Drops the cached list; the next read goes to the database.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
