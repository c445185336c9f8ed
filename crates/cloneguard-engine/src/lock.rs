//! Persisted TTL lock.
//!
//! Serializes the automatic-resolution pass across concurrent requests
//! sharing one database. Acquisition is a single conditional upsert, so the
//! read-check-write race of timestamp-file locks does not exist here: either
//! the insert lands, or the conflict branch only fires when the existing
//! holder has expired.
//!
//! Callers that fail to acquire skip their pass; the next request retries.

use tracing::debug;

use cloneguard_core::db::unix_timestamp;

use crate::storage::{Database, DatabaseError, LockRow};

/// Name of the lock guarding the automatic-resolution pass.
pub const RESOLUTION_LOCK: &str = "clone_resolution";

/// TTL-based mutual exclusion over a `locks` table row.
#[derive(Clone)]
pub struct PersistedLock {
    db: Database,
}

impl PersistedLock {
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Try to acquire the named lock for `ttl_secs`.
    ///
    /// Returns `true` when this caller now holds the lock: either no row
    /// existed, or the previous holder's TTL had elapsed.
    pub async fn try_acquire(&self, name: &str, ttl_secs: i64) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            r"
            INSERT INTO locks (name, acquired_at, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE locks.expires_at <= excluded.acquired_at
            ",
        )
        .bind(name)
        .bind(now)
        .bind(now + ttl_secs)
        .execute(self.db.pool())
        .await?;

        let acquired = result.rows_affected() > 0;
        if !acquired {
            debug!(name, "Lock held by an unexpired owner; skipping");
        }
        Ok(acquired)
    }

    /// Release the named lock. Releasing a lock that is not held is a no-op.
    pub async fn release(&self, name: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM locks WHERE name = ?")
            .bind(name)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Inspect the current holder row, if any.
    pub async fn current(&self, name: &str) -> Result<Option<LockRow>, DatabaseError> {
        let row = sqlx::query_as::<_, LockRow>("SELECT * FROM locks WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row)
    }
}
