//! Database connection and initialization.

pub use cloneguard_core::db::DatabaseError;

cloneguard_core::define_database!(Database, "Database migrations complete");
