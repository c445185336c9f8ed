//! Manual resolution actions.
//!
//! The host application surfaces three choices for an unresolved clone; each
//! maps to one [`ManualAction`]. Actions are idempotent: when the install is
//! already consistent with the live URL, nothing is stored and no report is
//! sent.

use std::str::FromStr;

use tracing::{info, warn};

use cloneguard_core::db::unix_timestamp;
use cloneguard_core::url::normalize_url;

use crate::api::{RemoteRegistry, ReportedOutcome};
use crate::detector;
use crate::storage::CloneState;

use super::{ResolutionError, Resolver};

/// User-chosen resolution for a clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualAction {
    /// The current site is the install's canonical home.
    NewHome,
    /// Short-term copy; full functionality for a grace window.
    TemporaryDuplicate,
    /// Permanently accepted duplicate; paid features degrade to free.
    LongTermDuplicate,
}

impl ManualAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewHome => "new_home",
            Self::TemporaryDuplicate => "temporary_duplicate",
            Self::LongTermDuplicate => "long_term_duplicate",
        }
    }
}

impl FromStr for ManualAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_home" | "new-home" => Ok(Self::NewHome),
            "temporary_duplicate" | "temporary-duplicate" => Ok(Self::TemporaryDuplicate),
            "long_term_duplicate" | "long-term-duplicate" => Ok(Self::LongTermDuplicate),
            other => Err(format!("Unknown resolution action: {other}")),
        }
    }
}

/// Result of applying a manual action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualOutcome {
    /// The action was applied.
    Applied,
    /// The install was already consistent; nothing changed.
    AlreadyConsistent,
}

impl<R: RemoteRegistry> Resolver<R> {
    /// Apply a user-chosen resolution action.
    pub async fn resolve_manually(
        &self,
        product_id: i64,
        live_url: &str,
        action: ManualAction,
    ) -> Result<ManualOutcome, ResolutionError> {
        let install = self
            .db
            .find_install(product_id)
            .await?
            .ok_or(ResolutionError::NoInstall(product_id))?;

        let verdict = detector::evaluate(&install.url, live_url, &self.config.staging_suffixes);
        if !verdict.is_clone() {
            // Idempotent: already consistent, no write, no report.
            return Ok(ManualOutcome::AlreadyConsistent);
        }

        let state = CloneState::new(self.db.clone(), product_id);
        let live_normalized = normalize_url(live_url);
        info!(product_id, action = action.as_str(), "Applying manual clone resolution");

        match action {
            ManualAction::NewHome => {
                // Prefer an existing registry record for the live URL; fall
                // back to re-pointing the stored install.
                let mut adopted_id = None;
                match self
                    .registry
                    .find_installs_by_url(product_id, &live_normalized)
                    .await
                {
                    Ok(candidates) => {
                        let matching = candidates
                            .into_iter()
                            .find(|candidate| normalize_url(&candidate.url) == live_normalized);
                        if let Some(remote) = matching {
                            adopted_id = Some(remote.id);
                            self.adopt_remote_install(product_id, &remote).await?;
                        }
                    }
                    Err(e) => {
                        warn!(product_id, error = %e, "Registry lookup failed during new-home sync");
                    }
                }
                if adopted_id.is_none() {
                    self.db.update_install_url(product_id, live_url).await?;
                }

                state.clear_resolution_state().await?;
                self.report(
                    product_id,
                    adopted_id.unwrap_or(install.install_id),
                    ReportedOutcome::NewHome,
                    &live_normalized,
                )
                .await;
            }
            ManualAction::TemporaryDuplicate => {
                // Still a clone; only the grace-window timestamp is stored
                // and no report is sent until a final choice is made.
                state
                    .select_temporary_duplicate_mode(unix_timestamp())
                    .await?;
            }
            ManualAction::LongTermDuplicate => {
                self.db.detach_license(product_id).await?;
                self.db.update_install_url(product_id, live_url).await?;
                state.clear_resolution_state().await?;
                self.report(
                    product_id,
                    install.install_id,
                    ReportedOutcome::LongTermDuplicate,
                    &live_normalized,
                )
                .await;
            }
        }

        Ok(ManualOutcome::Applied)
    }

    /// Whether a selected temporary-duplicate grace window has elapsed.
    pub async fn has_temporary_duplicate_mode_expired(
        &self,
        product_id: i64,
    ) -> Result<bool, ResolutionError> {
        let state = CloneState::new(self.db.clone(), product_id);
        Ok(state
            .has_temporary_duplicate_mode_expired(
                unix_timestamp(),
                self.config.temporary_duplicate_secs(),
            )
            .await?)
    }

    /// Suppress the manual-resolution notice for this product.
    pub async fn hide_manual_resolution(&self, product_id: i64) -> Result<(), ResolutionError> {
        let state = CloneState::new(self.db.clone(), product_id);
        state.set_hide_manual_resolution(true).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parses_both_separators() {
        assert_eq!(
            "new-home".parse::<ManualAction>().unwrap(),
            ManualAction::NewHome
        );
        assert_eq!(
            "temporary_duplicate".parse::<ManualAction>().unwrap(),
            ManualAction::TemporaryDuplicate
        );
        assert!("nuke".parse::<ManualAction>().is_err());
    }

    #[test]
    fn action_round_trips_through_str() {
        for action in [
            ManualAction::NewHome,
            ManualAction::TemporaryDuplicate,
            ManualAction::LongTermDuplicate,
        ] {
            assert_eq!(action.as_str().parse::<ManualAction>().unwrap(), action);
        }
    }
}
