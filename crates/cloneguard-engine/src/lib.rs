//! Cloneguard Engine Library
//!
//! Core functionality for the Cloneguard workflow:
//! - Sqlite storage for installs, licenses, and resolution state
//! - Persisted TTL lock serializing the automatic-resolution pass
//! - Remote install-registry client
//! - Clone detection and the automatic/manual resolution policies

pub mod api;
pub mod detector;
pub mod lock;
pub mod resolver;
pub mod storage;
