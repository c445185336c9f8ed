//! Clone detection.
//!
//! An install is a clone when its stored URL and the live site URL no longer
//! normalize to the same value. The verdict carries the live host's
//! classification, which decides whether license auto-activation may be
//! attempted during resolution.

use cloneguard_core::url::{HostKind, classify_host, host_of, normalize_url};

/// Result of comparing a stored install URL against the live site URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneVerdict {
    /// The URLs normalize to the same value; not a clone.
    NotClone,
    /// The URLs differ; the install was duplicated or moved.
    Clone {
        /// Classification of the live host.
        host_kind: HostKind,
    },
}

impl CloneVerdict {
    pub const fn is_clone(self) -> bool {
        matches!(self, Self::Clone { .. })
    }
}

/// Compare a stored install URL against the live site URL.
pub fn evaluate(stored_url: &str, live_url: &str, staging_suffixes: &[String]) -> CloneVerdict {
    let stored = normalize_url(stored_url);
    let live = normalize_url(live_url);

    if stored == live {
        return CloneVerdict::NotClone;
    }

    CloneVerdict::Clone {
        host_kind: classify_host(host_of(&live), staging_suffixes),
    }
}
