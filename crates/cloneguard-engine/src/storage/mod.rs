//! `SQLite` storage for the Cloneguard engine.
//!
//! Provides persistence for installs, licenses, install backups, and the
//! per-product resolution state bag.

mod db;
mod models;
mod queries;
mod state;

pub use db::{Database, DatabaseError};
pub use models::*;
pub use queries::InstallParams;
pub use state::{CloneState, Scope, keys};
