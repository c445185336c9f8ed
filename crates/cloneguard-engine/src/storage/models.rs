//! Database models for the Cloneguard engine.

use serde::{Deserialize, Serialize};

/// Install record from the database: the registered deployment of a product
/// on this site.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Install {
    pub product_id: i64,
    /// Remote registry id for this install.
    pub install_id: i64,
    pub user_id: i64,
    /// Stored site URL at registration time (pre-normalization).
    pub url: String,
    pub license_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub is_active: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// License record from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct License {
    pub id: i64,
    /// Activation quota; NULL means unlimited.
    pub quota: Option<i64>,
    /// Total activations counted against the quota.
    pub activated: i64,
    /// Localhost activations, not counted against the quota.
    pub activated_local: i64,
    pub expiration: Option<i64>,
    pub is_cancelled: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl License {
    /// Whether every quota slot is in use. Unlimited licenses are never
    /// fully utilized.
    pub fn is_fully_utilized(&self) -> bool {
        self.quota.is_some_and(|quota| self.activated >= quota)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expiration.is_some_and(|exp| exp <= now)
    }

    pub const fn is_cancelled(&self) -> bool {
        self.is_cancelled != 0
    }
}

/// Backup of an install row, taken before a destructive resolution step.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InstallBackup {
    pub product_id: i64,
    pub install_id: i64,
    pub user_id: i64,
    pub url: String,
    pub license_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub created_at: i64,
}

/// Lock record from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LockRow {
    pub name: String,
    pub acquired_at: i64,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn license(quota: Option<i64>, activated: i64) -> License {
        License {
            id: 1,
            quota,
            activated,
            activated_local: 0,
            expiration: None,
            is_cancelled: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn unlimited_license_never_utilized() {
        assert!(!license(None, 1_000_000).is_fully_utilized());
    }

    #[test]
    fn utilization_respects_quota() {
        assert!(!license(Some(3), 2).is_fully_utilized());
        assert!(license(Some(3), 3).is_fully_utilized());
    }

    #[test]
    fn expiry_is_inclusive() {
        let mut l = license(Some(1), 0);
        l.expiration = Some(100);
        assert!(!l.is_expired(99));
        assert!(l.is_expired(100));
    }
}
