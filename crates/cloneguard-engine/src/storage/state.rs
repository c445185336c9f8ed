//! Per-product resolution state bag.
//!
//! A flat key-value store scoped per product, with a `site`/`network` scope
//! column. The workflow never touches raw keys at call sites; the typed
//! [`CloneState`] accessor wraps the fixed field names below.
//!
//! Values are stored as JSON. Older deployments wrote array-wrapped values;
//! those rows are migrated in place on first read, best effort.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use cloneguard_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};

/// Fixed state-bag field names consumed by the resolution workflow.
pub mod keys {
    pub const CLONE_IDENTIFICATION_TIMESTAMP: &str = "clone_identification_timestamp";
    pub const TEMPORARY_DUPLICATE_MODE_SELECTION_TIMESTAMP: &str =
        "temporary_duplicate_mode_selection_timestamp";
    pub const REQUEST_HANDLER_ID: &str = "request_handler_id";
    pub const REQUEST_HANDLER_TIMESTAMP: &str = "request_handler_timestamp";
    pub const REQUEST_HANDLER_RETRIES_COUNT: &str = "request_handler_retries_count";
    pub const NEW_BLOG_INSTALL_MAP: &str = "new_blog_install_map";
    pub const HIDE_MANUAL_RESOLUTION: &str = "hide_manual_resolution";
}

/// Storage scope of a state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Specific to this site.
    Site,
    /// Shared across a network of sites.
    Network,
}

impl Scope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Network => "network",
        }
    }
}

impl Database {
    /// Read a state value, migrating legacy array-wrapped rows in place.
    pub async fn state_get(
        &self,
        product_id: i64,
        scope: Scope,
        key: &str,
    ) -> Result<Option<Value>, DatabaseError> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT value FROM state_entries WHERE product_id = ? AND scope = ? AND key = ?",
        )
        .bind(product_id)
        .bind(scope.as_str())
        .bind(key)
        .fetch_optional(self.pool())
        .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        // Non-JSON values come from very old writers; treat them as bare strings.
        let value = serde_json::from_str::<Value>(&raw)
            .unwrap_or_else(|_| Value::String(raw.clone()));

        // Legacy array-based rows hold the value as a single-element array.
        if let Value::Array(items) = value {
            let migrated = items.into_iter().next().unwrap_or(Value::Null);
            debug!(product_id, key, "Migrating legacy array-wrapped state value");
            if let Err(e) = self.state_set(product_id, scope, key, &migrated).await {
                warn!(product_id, key, error = %e, "Legacy state migration failed");
            }
            if migrated.is_null() {
                return Ok(None);
            }
            return Ok(Some(migrated));
        }

        Ok(Some(value))
    }

    /// Write a state value (last write wins).
    pub async fn state_set(
        &self,
        product_id: i64,
        scope: Scope,
        key: &str,
        value: &Value,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO state_entries (product_id, scope, key, value, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(product_id, scope, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(product_id)
        .bind(scope.as_str())
        .bind(key)
        .bind(value.to_string())
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Delete a state entry.
    pub async fn state_delete(
        &self,
        product_id: i64,
        scope: Scope,
        key: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM state_entries WHERE product_id = ? AND scope = ? AND key = ?")
            .bind(product_id)
            .bind(scope.as_str())
            .bind(key)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}

/// Typed accessor over the resolution state bag of one product.
#[derive(Clone)]
pub struct CloneState {
    db: Database,
    product_id: i64,
}

impl CloneState {
    pub const fn new(db: Database, product_id: i64) -> Self {
        Self { db, product_id }
    }

    async fn get_i64(&self, scope: Scope, key: &str) -> Result<Option<i64>, DatabaseError> {
        let value = self.db.state_get(self.product_id, scope, key).await?;
        Ok(value.and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }))
    }

    async fn set_i64(&self, scope: Scope, key: &str, value: i64) -> Result<(), DatabaseError> {
        self.db
            .state_set(self.product_id, scope, key, &Value::from(value))
            .await
    }

    // =========================================================================
    // Clone identification
    // =========================================================================

    /// When the clone condition was first observed, if ever.
    pub async fn clone_identification_timestamp(&self) -> Result<Option<i64>, DatabaseError> {
        self.get_i64(Scope::Site, keys::CLONE_IDENTIFICATION_TIMESTAMP)
            .await
    }

    /// Record the first observation of the clone condition. Keeps the
    /// original timestamp when one is already set.
    pub async fn mark_clone_identified(&self, now: i64) -> Result<i64, DatabaseError> {
        if let Some(existing) = self.clone_identification_timestamp().await? {
            return Ok(existing);
        }
        self.set_i64(Scope::Site, keys::CLONE_IDENTIFICATION_TIMESTAMP, now)
            .await?;
        Ok(now)
    }

    // =========================================================================
    // Request handler correlation
    // =========================================================================

    pub async fn request_handler_id(&self) -> Result<Option<String>, DatabaseError> {
        let value = self
            .db
            .state_get(self.product_id, Scope::Site, keys::REQUEST_HANDLER_ID)
            .await?;
        Ok(value.and_then(|v| v.as_str().map(ToString::to_string)))
    }

    /// Claim the resolution pass with a fresh handler id.
    pub async fn claim_handler(&self, handler_id: &str, now: i64) -> Result<(), DatabaseError> {
        self.db
            .state_set(
                self.product_id,
                Scope::Site,
                keys::REQUEST_HANDLER_ID,
                &Value::from(handler_id),
            )
            .await?;
        self.set_i64(Scope::Site, keys::REQUEST_HANDLER_TIMESTAMP, now)
            .await
    }

    pub async fn request_handler_timestamp(&self) -> Result<Option<i64>, DatabaseError> {
        self.get_i64(Scope::Site, keys::REQUEST_HANDLER_TIMESTAMP)
            .await
    }

    pub async fn request_handler_retries(&self) -> Result<u32, DatabaseError> {
        let count = self
            .get_i64(Scope::Site, keys::REQUEST_HANDLER_RETRIES_COUNT)
            .await?
            .unwrap_or(0);
        Ok(u32::try_from(count).unwrap_or(0))
    }

    /// Bump the attempt counter, returning the new value.
    pub async fn increment_handler_retries(&self) -> Result<u32, DatabaseError> {
        let next = self.request_handler_retries().await? + 1;
        self.set_i64(
            Scope::Site,
            keys::REQUEST_HANDLER_RETRIES_COUNT,
            i64::from(next),
        )
        .await?;
        Ok(next)
    }

    /// Force the attempt counter to a given value (used when an attempt
    /// determines no automatic path can ever apply).
    pub async fn set_handler_retries(&self, count: u32) -> Result<(), DatabaseError> {
        self.set_i64(
            Scope::Site,
            keys::REQUEST_HANDLER_RETRIES_COUNT,
            i64::from(count),
        )
        .await
    }

    // =========================================================================
    // Temporary duplicate mode
    // =========================================================================

    pub async fn temporary_duplicate_selection_timestamp(
        &self,
    ) -> Result<Option<i64>, DatabaseError> {
        self.get_i64(
            Scope::Site,
            keys::TEMPORARY_DUPLICATE_MODE_SELECTION_TIMESTAMP,
        )
        .await
    }

    pub async fn select_temporary_duplicate_mode(&self, now: i64) -> Result<(), DatabaseError> {
        self.set_i64(
            Scope::Site,
            keys::TEMPORARY_DUPLICATE_MODE_SELECTION_TIMESTAMP,
            now,
        )
        .await
    }

    /// Whether the temporary-duplicate grace window has elapsed. `false`
    /// when the mode was never selected.
    pub async fn has_temporary_duplicate_mode_expired(
        &self,
        now: i64,
        period_secs: i64,
    ) -> Result<bool, DatabaseError> {
        let Some(selected_at) = self.temporary_duplicate_selection_timestamp().await? else {
            return Ok(false);
        };
        Ok(now >= selected_at + period_secs)
    }

    // =========================================================================
    // Manual-resolution surface
    // =========================================================================

    pub async fn hide_manual_resolution(&self) -> Result<bool, DatabaseError> {
        let value = self
            .db
            .state_get(self.product_id, Scope::Network, keys::HIDE_MANUAL_RESOLUTION)
            .await?;
        Ok(value.is_some_and(|v| v.as_bool() == Some(true) || v.as_i64() == Some(1)))
    }

    pub async fn set_hide_manual_resolution(&self, hide: bool) -> Result<(), DatabaseError> {
        self.db
            .state_set(
                self.product_id,
                Scope::Network,
                keys::HIDE_MANUAL_RESOLUTION,
                &Value::from(hide),
            )
            .await
    }

    // =========================================================================
    // Network-subsite install map
    // =========================================================================

    /// Installs created for newly added network sites, keyed by blog id.
    pub async fn new_blog_install_map(&self) -> Result<HashMap<i64, i64>, DatabaseError> {
        let value = self
            .db
            .state_get(self.product_id, Scope::Network, keys::NEW_BLOG_INSTALL_MAP)
            .await?;

        let Some(Value::Object(entries)) = value else {
            return Ok(HashMap::new());
        };

        Ok(entries
            .into_iter()
            .filter_map(|(blog_id, install_id)| {
                Some((blog_id.parse().ok()?, install_id.as_i64()?))
            })
            .collect())
    }

    /// Record the install created for a new network site.
    pub async fn record_new_blog_install(
        &self,
        blog_id: i64,
        install_id: i64,
    ) -> Result<(), DatabaseError> {
        let mut map = self.new_blog_install_map().await?;
        map.insert(blog_id, install_id);

        let object: serde_json::Map<String, Value> = map
            .into_iter()
            .map(|(blog_id, install_id)| (blog_id.to_string(), Value::from(install_id)))
            .collect();
        self.db
            .state_set(
                self.product_id,
                Scope::Network,
                keys::NEW_BLOG_INSTALL_MAP,
                &Value::Object(object),
            )
            .await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Drop every site-scoped resolution key. Called when the install's URL
    /// matches the live URL again (resolution complete).
    pub async fn clear_resolution_state(&self) -> Result<(), DatabaseError> {
        for key in [
            keys::CLONE_IDENTIFICATION_TIMESTAMP,
            keys::TEMPORARY_DUPLICATE_MODE_SELECTION_TIMESTAMP,
            keys::REQUEST_HANDLER_ID,
            keys::REQUEST_HANDLER_TIMESTAMP,
            keys::REQUEST_HANDLER_RETRIES_COUNT,
        ] {
            self.db.state_delete(self.product_id, Scope::Site, key).await?;
        }
        Ok(())
    }

    /// Whether the state bag currently records an unresolved clone.
    pub async fn is_clone_identified(&self) -> Result<bool, DatabaseError> {
        Ok(self.clone_identification_timestamp().await?.is_some())
    }
}
