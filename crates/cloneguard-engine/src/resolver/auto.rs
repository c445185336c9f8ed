//! Automatic resolution policy.
//!
//! One pass per incoming request, serialized by the persisted lock:
//! search the registry for an install already living at the live URL; failing
//! that, retry license activation for localhost and network-subsite clones;
//! failing that, require manual resolution. Attempts are bounded by
//! `ResolutionConfig::max_retries`.

use tracing::{info, warn};
use uuid::Uuid;

use cloneguard_core::db::unix_timestamp;
use cloneguard_core::url::{HostKind, normalize_url};

use crate::api::{NewInstall, RemoteInstall, RemoteRegistry, ReportedOutcome, ResolutionReport};
use crate::detector::{self, CloneVerdict};
use crate::lock::RESOLUTION_LOCK;
use crate::storage::{CloneState, Install, InstallParams};

use super::{PassOutcome, ResolutionError, Resolver};

impl<R: RemoteRegistry> Resolver<R> {
    /// Run one automatic-resolution pass for a product.
    ///
    /// `live_url` is the site's current URL as seen by the host application.
    /// Never raises registry failures; they degrade within the pass.
    pub async fn run_automatic_pass(
        &self,
        product_id: i64,
        live_url: &str,
    ) -> Result<PassOutcome, ResolutionError> {
        let install = self
            .db
            .find_install(product_id)
            .await?
            .ok_or(ResolutionError::NoInstall(product_id))?;

        let verdict = detector::evaluate(&install.url, live_url, &self.config.staging_suffixes);
        let state = CloneState::new(self.db.clone(), product_id);

        let CloneVerdict::Clone { host_kind } = verdict else {
            // Clone condition no longer holds; resolution is complete.
            if state.is_clone_identified().await? {
                info!(product_id, "Install URL matches live URL again; clearing clone state");
                state.clear_resolution_state().await?;
            }
            return Ok(PassOutcome::NotClone);
        };

        state.mark_clone_identified(unix_timestamp()).await?;

        if state.request_handler_retries().await? >= self.config.max_retries {
            return Ok(PassOutcome::ManualRequired);
        }

        if !self
            .lock
            .try_acquire(RESOLUTION_LOCK, self.config.lock_ttl_secs)
            .await?
        {
            return Ok(PassOutcome::Skipped);
        }

        let outcome = self.run_locked(&install, live_url, host_kind, &state).await;
        self.lock.release(RESOLUTION_LOCK).await?;
        outcome
    }

    async fn run_locked(
        &self,
        install: &Install,
        live_url: &str,
        host_kind: HostKind,
        state: &CloneState,
    ) -> Result<PassOutcome, ResolutionError> {
        let handler_id = Uuid::new_v4().to_string();
        state.claim_handler(&handler_id, unix_timestamp()).await?;
        let attempt = state.increment_handler_retries().await?;
        info!(
            product_id = install.product_id,
            attempt, "Starting automatic clone-resolution attempt"
        );

        let live_normalized = normalize_url(live_url);

        // Searching: an install already registered at the live URL wins.
        match self
            .registry
            .find_installs_by_url(install.product_id, &live_normalized)
            .await
        {
            Ok(candidates) => {
                let matching = candidates.into_iter().find(|candidate| {
                    candidate.id != install.install_id
                        && normalize_url(&candidate.url) == live_normalized
                });
                if let Some(remote) = matching {
                    if self.pass_is_stale(state, &handler_id).await? {
                        return Ok(PassOutcome::Skipped);
                    }
                    info!(
                        product_id = install.product_id,
                        remote_install_id = remote.id,
                        "Adopting remote install matching the live URL"
                    );
                    self.adopt_remote_install(install.product_id, &remote).await?;
                    state.clear_resolution_state().await?;
                    self.report(
                        install.product_id,
                        remote.id,
                        ReportedOutcome::AutomaticReplacement,
                        &live_normalized,
                    )
                    .await;
                    return Ok(PassOutcome::Resolved);
                }
            }
            Err(e) => {
                // Transient failure behaves as "not found" for this pass.
                warn!(
                    product_id = install.product_id,
                    error = %e,
                    "Registry lookup failed; falling through to license retry"
                );
            }
        }

        // License retry: recreate the install under the same identity.
        if self.license_retry_applies(install, host_kind, state).await? {
            self.db.backup_install(install.product_id).await?;
            match self
                .retry_license_activation(install, &live_normalized)
                .await
            {
                Ok(remote) => {
                    if self.pass_is_stale(state, &handler_id).await? {
                        return Ok(PassOutcome::Skipped);
                    }
                    self.adopt_remote_install(install.product_id, &remote).await?;
                    if let Some(license_id) = remote.license_id {
                        self.db
                            .record_license_activation(
                                license_id,
                                host_kind == HostKind::Localhost,
                            )
                            .await?;
                    }
                    self.db.clear_install_backup(install.product_id).await?;
                    state.clear_resolution_state().await?;
                    self.report(
                        install.product_id,
                        remote.id,
                        ReportedOutcome::AutomaticReplacement,
                        &live_normalized,
                    )
                    .await;
                    info!(
                        product_id = install.product_id,
                        remote_install_id = remote.id,
                        "License re-activated on a fresh install"
                    );
                    return Ok(PassOutcome::Resolved);
                }
                Err(e) => {
                    warn!(
                        product_id = install.product_id,
                        error = %e,
                        "License retry failed; restoring install from backup"
                    );
                    self.db.restore_install_backup(install.product_id).await?;
                    if attempt >= self.config.max_retries {
                        return Ok(PassOutcome::ManualRequired);
                    }
                    return Ok(PassOutcome::Failed);
                }
            }
        }

        // No automatic path applies; stop retrying until a user acts.
        state.set_handler_retries(self.config.max_retries).await?;
        info!(
            product_id = install.product_id,
            "Automatic resolution exhausted; manual resolution required"
        );
        Ok(PassOutcome::ManualRequired)
    }

    /// A pass is stale when another pass has claimed the handler id since.
    async fn pass_is_stale(
        &self,
        state: &CloneState,
        handler_id: &str,
    ) -> Result<bool, ResolutionError> {
        let current = state.request_handler_id().await?;
        Ok(current.as_deref() != Some(handler_id))
    }

    async fn license_retry_applies(
        &self,
        install: &Install,
        host_kind: HostKind,
        state: &CloneState,
    ) -> Result<bool, ResolutionError> {
        let Some(license_id) = install.license_id else {
            return Ok(false);
        };

        let license = match self.db.get_license(license_id).await {
            Ok(license) => license,
            // An unknown license cannot be re-activated.
            Err(_) => return Ok(false),
        };

        let now = unix_timestamp();
        if license.is_fully_utilized() || license.is_cancelled() || license.is_expired(now) {
            return Ok(false);
        }

        let on_localhost = host_kind == HostKind::Localhost && self.config.localhost_activation;
        if on_localhost {
            return Ok(true);
        }

        // A network-subsite clone: the local install id was handed to a
        // newly created network site.
        let map = state.new_blog_install_map().await?;
        Ok(map.values().any(|&install_id| install_id == install.install_id))
    }

    /// Deactivate the old install and create a fresh one carrying the same
    /// license. The caller has already snapshotted the install row.
    async fn retry_license_activation(
        &self,
        install: &Install,
        live_normalized: &str,
    ) -> Result<RemoteInstall, crate::api::RegistryError> {
        self.registry
            .deactivate_install(install.product_id, install.install_id)
            .await?;

        self.registry
            .create_install(
                install.product_id,
                &NewInstall {
                    url: live_normalized.to_string(),
                    user_id: install.user_id,
                    license_id: install.license_id,
                },
            )
            .await
    }

    /// Replace the local install row with a registry record.
    pub(crate) async fn adopt_remote_install(
        &self,
        product_id: i64,
        remote: &RemoteInstall,
    ) -> Result<(), ResolutionError> {
        self.db
            .upsert_install(
                product_id,
                &InstallParams {
                    install_id: remote.id,
                    user_id: remote.user_id,
                    url: remote.url.clone(),
                    license_id: remote.license_id,
                    plan_id: remote.plan_id,
                },
            )
            .await?;
        Ok(())
    }

    /// Fire-and-forget resolution report; failures are logged, not raised.
    pub(crate) async fn report(
        &self,
        product_id: i64,
        install_id: i64,
        outcome: ReportedOutcome,
        url: &str,
    ) {
        let report = ResolutionReport {
            outcome,
            url: url.to_string(),
        };
        if let Err(e) = self
            .registry
            .report_resolution(product_id, install_id, &report)
            .await
        {
            warn!(product_id, install_id, error = %e, "Failed to report clone resolution");
        }
    }

    /// Summarize the clone state of a product for operator surfaces.
    pub async fn status(
        &self,
        product_id: i64,
        live_url: &str,
    ) -> Result<super::CloneStatus, ResolutionError> {
        let install = self
            .db
            .find_install(product_id)
            .await?
            .ok_or(ResolutionError::NoInstall(product_id))?;

        let verdict = detector::evaluate(&install.url, live_url, &self.config.staging_suffixes);
        let state = CloneState::new(self.db.clone(), product_id);

        let attempts = state.request_handler_retries().await?;
        let temporary_duplicate_expires_at = state
            .temporary_duplicate_selection_timestamp()
            .await?
            .map(|selected| selected + self.config.temporary_duplicate_secs());

        let host_kind = match verdict {
            CloneVerdict::Clone { host_kind } => Some(host_kind),
            CloneVerdict::NotClone => None,
        };

        Ok(super::CloneStatus {
            is_clone: verdict.is_clone(),
            host_kind,
            identified_at: state.clone_identification_timestamp().await?,
            attempts,
            manual_required: verdict.is_clone() && attempts >= self.config.max_retries,
            manual_hidden: state.hide_manual_resolution().await?,
            temporary_duplicate_expires_at,
        })
    }
}
