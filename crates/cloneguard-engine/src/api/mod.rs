//! Remote install-registry API.
//!
//! The resolution workflow talks to the registry through the
//! [`RemoteRegistry`] trait; the reqwest-backed [`RegistryClient`] is the
//! production implementation, and tests substitute an in-memory fake.

mod client;
mod types;

pub use client::{RegistryClient, RegistryError};
pub use types::{NewInstall, RemoteInstall, ReportedOutcome, ResolutionReport};

/// Operations the resolution workflow needs from the remote registry.
pub trait RemoteRegistry {
    /// Search installs of a product by (normalized) site URL.
    fn find_installs_by_url(
        &self,
        product_id: i64,
        url: &str,
    ) -> impl Future<Output = Result<Vec<RemoteInstall>, RegistryError>> + Send;

    /// Create a fresh install record, activating its license when one is set.
    fn create_install(
        &self,
        product_id: i64,
        new_install: &NewInstall,
    ) -> impl Future<Output = Result<RemoteInstall, RegistryError>> + Send;

    /// Deactivate an install, releasing its license activation.
    fn deactivate_install(
        &self,
        product_id: i64,
        install_id: i64,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Notify the registry how a clone was resolved.
    fn report_resolution(
        &self,
        product_id: i64,
        install_id: i64,
        report: &ResolutionReport,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;
}
