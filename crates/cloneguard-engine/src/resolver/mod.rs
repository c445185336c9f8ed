//! Clone-resolution policies.
//!
//! [`Resolver`] drives both halves of the workflow: the automatic pass
//! (remote search, then license retry, then giving up to manual) and the
//! user-chosen manual actions (new home / temporary duplicate / long-term
//! duplicate). All state changes go through the storage layer; the remote
//! registry is injected through the [`RemoteRegistry`] trait.

mod auto;
mod manual;

use thiserror::Error;

use cloneguard_core::config::ResolutionConfig;
use cloneguard_core::url::HostKind;

use crate::api::RemoteRegistry;
use crate::lock::PersistedLock;
use crate::storage::{Database, DatabaseError};

pub use manual::{ManualAction, ManualOutcome};

/// Errors surfaced by the resolution workflow.
///
/// Registry failures are intentionally absent: inside a pass they degrade to
/// "not found" or a failed attempt, never an error for the caller.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("No install registered for product {0}")]
    NoInstall(i64),
}

/// Outcome of one automatic-resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Stored and live URLs match; nothing to resolve.
    NotClone,
    /// Another request holds the resolution lock; nothing was attempted.
    Skipped,
    /// The clone was resolved automatically.
    Resolved,
    /// The attempt failed; a later pass may retry.
    Failed,
    /// Automatic resolution cannot apply; a user must choose an action.
    ManualRequired,
}

/// Point-in-time view of a product's clone state, for operator surfaces.
#[derive(Debug, Clone)]
pub struct CloneStatus {
    pub is_clone: bool,
    pub host_kind: Option<HostKind>,
    pub identified_at: Option<i64>,
    pub attempts: u32,
    pub manual_required: bool,
    pub manual_hidden: bool,
    pub temporary_duplicate_expires_at: Option<i64>,
}

/// Clone-resolution service over one database and one remote registry.
pub struct Resolver<R> {
    pub(crate) db: Database,
    pub(crate) registry: R,
    pub(crate) lock: PersistedLock,
    pub(crate) config: ResolutionConfig,
}

impl<R: RemoteRegistry> Resolver<R> {
    pub fn new(db: Database, registry: R, config: ResolutionConfig) -> Self {
        let lock = PersistedLock::new(db.clone());
        Self {
            db,
            registry,
            lock,
            config,
        }
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    pub const fn registry(&self) -> &R {
        &self.registry
    }
}
