//! Database queries for the Cloneguard engine.

use cloneguard_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::{Install, InstallBackup, License};

/// Fields identifying an install being registered or replaced.
#[derive(Debug, Clone)]
pub struct InstallParams {
    pub install_id: i64,
    pub user_id: i64,
    pub url: String,
    pub license_id: Option<i64>,
    pub plan_id: Option<i64>,
}

impl Database {
    // =========================================================================
    // Install queries
    // =========================================================================

    /// Register (or replace) the install of a product on this site.
    pub async fn upsert_install(
        &self,
        product_id: i64,
        params: &InstallParams,
    ) -> Result<Install, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO installs (product_id, install_id, user_id, url, license_id, plan_id, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(product_id) DO UPDATE SET
                install_id = excluded.install_id,
                user_id = excluded.user_id,
                url = excluded.url,
                license_id = excluded.license_id,
                plan_id = excluded.plan_id,
                is_active = 1,
                updated_at = excluded.updated_at
            ",
        )
        .bind(product_id)
        .bind(params.install_id)
        .bind(params.user_id)
        .bind(&params.url)
        .bind(params.license_id)
        .bind(params.plan_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_install(product_id).await
    }

    /// Get the install of a product, if registered.
    pub async fn find_install(&self, product_id: i64) -> Result<Option<Install>, DatabaseError> {
        let install = sqlx::query_as::<_, Install>("SELECT * FROM installs WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(install)
    }

    /// Get the install of a product, erroring when absent.
    pub async fn get_install(&self, product_id: i64) -> Result<Install, DatabaseError> {
        self.find_install(product_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Install for product {product_id}")))
    }

    /// Update the stored URL of an install.
    pub async fn update_install_url(
        &self,
        product_id: i64,
        url: &str,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("UPDATE installs SET url = ?, updated_at = ? WHERE product_id = ?")
            .bind(url)
            .bind(now)
            .bind(product_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Detach the license from an install (paid features degrade to free).
    pub async fn detach_license(&self, product_id: i64) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("UPDATE installs SET license_id = NULL, updated_at = ? WHERE product_id = ?")
            .bind(now)
            .bind(product_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    // =========================================================================
    // License queries
    // =========================================================================

    /// Insert or update a license record.
    pub async fn upsert_license(
        &self,
        id: i64,
        quota: Option<i64>,
        activated: i64,
        activated_local: i64,
        expiration: Option<i64>,
        is_cancelled: bool,
    ) -> Result<License, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO licenses (id, quota, activated, activated_local, expiration, is_cancelled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                quota = excluded.quota,
                activated = excluded.activated,
                activated_local = excluded.activated_local,
                expiration = excluded.expiration,
                is_cancelled = excluded.is_cancelled,
                updated_at = excluded.updated_at
            ",
        )
        .bind(id)
        .bind(quota)
        .bind(activated)
        .bind(activated_local)
        .bind(expiration)
        .bind(i64::from(is_cancelled))
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_license(id).await
    }

    /// Get a license by ID.
    pub async fn get_license(&self, id: i64) -> Result<License, DatabaseError> {
        sqlx::query_as::<_, License>("SELECT * FROM licenses WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("License {id}")))
    }

    /// Count one more activation against a license. `local` activations do
    /// not consume quota.
    pub async fn record_license_activation(
        &self,
        id: i64,
        local: bool,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        let sql = if local {
            "UPDATE licenses SET activated_local = activated_local + 1, updated_at = ? WHERE id = ?"
        } else {
            "UPDATE licenses SET activated = activated + 1, updated_at = ? WHERE id = ?"
        };
        sqlx::query(sql).bind(now).bind(id).execute(self.pool()).await?;

        Ok(())
    }

    // =========================================================================
    // Install backup queries
    // =========================================================================

    /// Snapshot the current install row before a destructive step.
    pub async fn backup_install(&self, product_id: i64) -> Result<(), DatabaseError> {
        let install = self.get_install(product_id).await?;
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO install_backups (product_id, install_id, user_id, url, license_id, plan_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_id) DO UPDATE SET
                install_id = excluded.install_id,
                user_id = excluded.user_id,
                url = excluded.url,
                license_id = excluded.license_id,
                plan_id = excluded.plan_id,
                created_at = excluded.created_at
            ",
        )
        .bind(install.product_id)
        .bind(install.install_id)
        .bind(install.user_id)
        .bind(&install.url)
        .bind(install.license_id)
        .bind(install.plan_id)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Restore the install row from its backup. Returns `false` when no
    /// backup exists.
    pub async fn restore_install_backup(&self, product_id: i64) -> Result<bool, DatabaseError> {
        let backup = sqlx::query_as::<_, InstallBackup>(
            "SELECT * FROM install_backups WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(backup) = backup else {
            return Ok(false);
        };

        self.upsert_install(
            product_id,
            &InstallParams {
                install_id: backup.install_id,
                user_id: backup.user_id,
                url: backup.url,
                license_id: backup.license_id,
                plan_id: backup.plan_id,
            },
        )
        .await?;
        self.clear_install_backup(product_id).await?;

        Ok(true)
    }

    /// Drop the backup row once it is no longer needed.
    pub async fn clear_install_backup(&self, product_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM install_backups WHERE product_id = ?")
            .bind(product_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
