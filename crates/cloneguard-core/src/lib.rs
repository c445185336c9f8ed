//! `Cloneguard` Core Library
//!
//! Shared functionality for `Cloneguard` components:
//! - URL normalization and host classification
//! - Configuration resolution and hierarchy
//! - Sqlite pool helpers shared by the engine storage layer
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;
pub mod url;

pub use config::Config;
pub use error::{Error, Result};
pub use url::{HostKind, classify_host, normalize_url};
