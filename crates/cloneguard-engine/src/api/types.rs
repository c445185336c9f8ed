//! Install-registry API request/response types.
//!
//! Serialization structs matching the registry's JSON payloads.

use serde::{Deserialize, Serialize};

/// Install record as returned by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteInstall {
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub license_id: Option<i64>,
    pub user_id: i64,
    #[serde(default)]
    pub plan_id: Option<i64>,
}

/// Search response wrapper for `GET /products/{id}/installs.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallSearchPage {
    #[serde(default)]
    pub installs: Vec<RemoteInstall>,
}

/// Payload for creating a fresh install under an existing identity.
#[derive(Debug, Clone, Serialize)]
pub struct NewInstall {
    pub url: String,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_id: Option<i64>,
}

/// How a clone was ultimately resolved, as reported to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedOutcome {
    NewHome,
    LongTermDuplicate,
    AutomaticReplacement,
}

/// Resolution-update notification POSTed back to the registry.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub outcome: ReportedOutcome,
    /// The live URL the install settled on.
    pub url: String,
}
