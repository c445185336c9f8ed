#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Integration tests for the clone-resolution workflow.
//!
//! Tests the full flow over an in-memory database: detection → automatic
//! pass (search / license retry / manual fallback) → manual actions, with
//! the remote registry replaced by an in-memory fake.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use cloneguard_core::config::ResolutionConfig;
use cloneguard_engine::api::{
    NewInstall, RegistryError, RemoteInstall, RemoteRegistry, ReportedOutcome, ResolutionReport,
};
use cloneguard_engine::lock::{PersistedLock, RESOLUTION_LOCK};
use cloneguard_engine::resolver::{ManualAction, ManualOutcome, PassOutcome, Resolver};
use cloneguard_engine::storage::{CloneState, Database, InstallParams};

const PRODUCT: i64 = 11;
const STORED_URL: &str = "https://example.com";

/// In-memory registry fake with scriptable failures.
#[derive(Default)]
struct FakeRegistry {
    remote_installs: Mutex<Vec<RemoteInstall>>,
    created: Mutex<Vec<NewInstall>>,
    deactivated: Mutex<Vec<i64>>,
    reports: Mutex<Vec<(i64, ReportedOutcome)>>,
    next_id: AtomicI64,
    fail_lookup: AtomicBool,
    fail_create: AtomicBool,
}

impl FakeRegistry {
    fn with_remote_install(install: RemoteInstall) -> Self {
        let fake = Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        };
        fake.remote_installs.lock().unwrap().push(install);
        fake
    }

    fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

impl RemoteRegistry for FakeRegistry {
    async fn find_installs_by_url(
        &self,
        _product_id: i64,
        url: &str,
    ) -> Result<Vec<RemoteInstall>, RegistryError> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(RegistryError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        let matches = self
            .remote_installs
            .lock()
            .unwrap()
            .iter()
            .filter(|install| install.url == url)
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn create_install(
        &self,
        _product_id: i64,
        new_install: &NewInstall,
    ) -> Result<RemoteInstall, RegistryError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RegistryError::Api {
                status: 402,
                message: "license activation rejected".into(),
            });
        }
        self.created.lock().unwrap().push(new_install.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(RemoteInstall {
            id,
            url: new_install.url.clone(),
            license_id: new_install.license_id,
            user_id: new_install.user_id,
            plan_id: None,
        })
    }

    async fn deactivate_install(
        &self,
        _product_id: i64,
        install_id: i64,
    ) -> Result<(), RegistryError> {
        self.deactivated.lock().unwrap().push(install_id);
        Ok(())
    }

    async fn report_resolution(
        &self,
        _product_id: i64,
        install_id: i64,
        report: &ResolutionReport,
    ) -> Result<(), RegistryError> {
        self.reports.lock().unwrap().push((install_id, report.outcome));
        Ok(())
    }
}

async fn resolver_with(
    registry: FakeRegistry,
    license_id: Option<i64>,
) -> Resolver<FakeRegistry> {
    let db = Database::open_in_memory().await.unwrap();
    db.upsert_install(
        PRODUCT,
        &InstallParams {
            install_id: 100,
            user_id: 7,
            url: STORED_URL.to_string(),
            license_id,
            plan_id: Some(2),
        },
    )
    .await
    .unwrap();
    if let Some(id) = license_id {
        db.upsert_license(id, Some(5), 1, 0, None, false).await.unwrap();
    }
    Resolver::new(db, registry, ResolutionConfig::default())
}

#[tokio::test]
async fn matching_urls_are_not_a_clone() {
    let resolver = resolver_with(FakeRegistry::default(), None).await;

    let outcome = resolver
        .run_automatic_pass(PRODUCT, "http://EXAMPLE.com/")
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::NotClone);
    let status = resolver.status(PRODUCT, "http://EXAMPLE.com/").await.unwrap();
    assert!(!status.is_clone);
    assert!(status.identified_at.is_none());
}

#[tokio::test]
async fn matching_urls_clear_stale_clone_state() {
    let resolver = resolver_with(FakeRegistry::default(), None).await;
    let state = CloneState::new(resolver.database().clone(), PRODUCT);
    state.mark_clone_identified(1000).await.unwrap();

    let outcome = resolver
        .run_automatic_pass(PRODUCT, STORED_URL)
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::NotClone);
    assert!(!state.is_clone_identified().await.unwrap());
}

#[tokio::test]
async fn remote_install_at_live_url_is_adopted() {
    let live_url = "https://new-home.example.net";
    let registry = FakeRegistry::with_remote_install(RemoteInstall {
        id: 999,
        url: "new-home.example.net".to_string(),
        license_id: Some(5),
        user_id: 7,
        plan_id: Some(2),
    });
    let resolver = resolver_with(registry, Some(5)).await;

    let outcome = resolver
        .run_automatic_pass(PRODUCT, live_url)
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::Resolved);

    // Local install replaced with the remote record.
    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert_eq!(install.install_id, 999);
    assert_eq!(install.url, "new-home.example.net");

    // Resolution record cleared; subsequent passes see no clone.
    let status = resolver.status(PRODUCT, live_url).await.unwrap();
    assert!(!status.is_clone);
    assert!(status.identified_at.is_none());
}

#[tokio::test]
async fn held_lock_skips_the_pass() {
    let resolver = resolver_with(FakeRegistry::default(), None).await;
    let lock = PersistedLock::new(resolver.database().clone());
    assert!(lock.try_acquire(RESOLUTION_LOCK, 180).await.unwrap());

    let outcome = resolver
        .run_automatic_pass(PRODUCT, "https://copy.example.net")
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::Skipped);
}

#[tokio::test]
async fn production_clone_without_license_requires_manual_resolution() {
    let resolver = resolver_with(FakeRegistry::default(), None).await;

    let outcome = resolver
        .run_automatic_pass(PRODUCT, "https://copy.example.net")
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::ManualRequired);

    let status = resolver.status(PRODUCT, "https://copy.example.net").await.unwrap();
    assert!(status.manual_required);
    assert!(status.identified_at.is_some());
}

#[tokio::test]
async fn failed_license_retries_are_bounded() {
    let registry = FakeRegistry::default();
    registry.fail_create.store(true, Ordering::SeqCst);
    let resolver = resolver_with(registry, Some(5)).await;
    let live_url = "http://localhost:8080";

    // Attempts 1 and 2 fail and stay retryable; the lock is released when
    // each pass finishes.
    for _ in 0..2 {
        let outcome = resolver.run_automatic_pass(PRODUCT, live_url).await.unwrap();
        assert_eq!(outcome, PassOutcome::Failed);
    }

    // Attempt 3 exhausts the budget.
    let outcome = resolver.run_automatic_pass(PRODUCT, live_url).await.unwrap();
    assert_eq!(outcome, PassOutcome::ManualRequired);

    // Later passes never loop back into automatic resolution.
    let outcome = resolver.run_automatic_pass(PRODUCT, live_url).await.unwrap();
    assert_eq!(outcome, PassOutcome::ManualRequired);

    let status = resolver.status(PRODUCT, live_url).await.unwrap();
    assert_eq!(status.attempts, 3);
    assert!(status.manual_required);

    // Every failed attempt restored the original install.
    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert_eq!(install.install_id, 100);
    assert_eq!(install.url, STORED_URL);
}

#[tokio::test]
async fn localhost_license_retry_creates_fresh_install() {
    let registry = FakeRegistry {
        next_id: AtomicI64::new(500),
        ..FakeRegistry::default()
    };
    let resolver = resolver_with(registry, Some(5)).await;
    let live_url = "http://localhost:8080";

    let outcome = resolver.run_automatic_pass(PRODUCT, live_url).await.unwrap();
    assert_eq!(outcome, PassOutcome::Resolved);

    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert_eq!(install.install_id, 500);
    assert_eq!(install.url, "localhost:8080");
    assert_eq!(install.license_id, Some(5));

    // The old install was deactivated remotely.
    assert_eq!(*resolver.registry().deactivated.lock().unwrap(), vec![100]);

    // Localhost activation does not consume license quota.
    let license = resolver.database().get_license(5).await.unwrap();
    assert_eq!(license.activated, 1);
    assert_eq!(license.activated_local, 1);
}

#[tokio::test]
async fn subsite_clone_uses_license_retry() {
    let registry = FakeRegistry {
        next_id: AtomicI64::new(600),
        ..FakeRegistry::default()
    };
    let resolver = resolver_with(registry, Some(5)).await;
    // The local install id was handed out to a newly created network site.
    let state = CloneState::new(resolver.database().clone(), PRODUCT);
    state.record_new_blog_install(3, 100).await.unwrap();

    let outcome = resolver
        .run_automatic_pass(PRODUCT, "https://sub.example.net")
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::Resolved);
    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert_eq!(install.install_id, 600);
}

#[tokio::test]
async fn lookup_failure_degrades_to_manual_for_production_clone() {
    let registry = FakeRegistry::with_remote_install(RemoteInstall {
        id: 999,
        url: "copy.example.net".to_string(),
        license_id: None,
        user_id: 7,
        plan_id: None,
    });
    registry.fail_lookup.store(true, Ordering::SeqCst);
    let resolver = resolver_with(registry, None).await;

    // The matching remote record is unreachable; the pass falls through.
    let outcome = resolver
        .run_automatic_pass(PRODUCT, "https://copy.example.net")
        .await
        .unwrap();

    assert_eq!(outcome, PassOutcome::ManualRequired);
}

#[tokio::test]
async fn long_term_duplicate_detaches_license_and_reports_once() {
    let resolver = resolver_with(FakeRegistry::default(), Some(5)).await;
    let live_url = "https://copy.example.net";

    let outcome = resolver
        .resolve_manually(PRODUCT, live_url, ManualAction::LongTermDuplicate)
        .await
        .unwrap();
    assert_eq!(outcome, ManualOutcome::Applied);

    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert!(install.license_id.is_none());
    assert_eq!(install.url, live_url);

    let reports = resolver.registry().reports.lock().unwrap().clone();
    assert_eq!(reports, vec![(100, ReportedOutcome::LongTermDuplicate)]);
}

#[tokio::test]
async fn long_term_duplicate_on_consistent_install_is_noop() {
    let resolver = resolver_with(FakeRegistry::default(), Some(5)).await;

    let outcome = resolver
        .resolve_manually(PRODUCT, STORED_URL, ManualAction::LongTermDuplicate)
        .await
        .unwrap();

    assert_eq!(outcome, ManualOutcome::AlreadyConsistent);

    // Storage unchanged, no remote report.
    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert_eq!(install.license_id, Some(5));
    assert_eq!(install.url, STORED_URL);
    assert_eq!(resolver.registry().report_count(), 0);
}

#[tokio::test]
async fn new_home_adopts_remote_record_and_reports() {
    let live_url = "https://new-home.example.net";
    let registry = FakeRegistry::with_remote_install(RemoteInstall {
        id: 999,
        url: "new-home.example.net".to_string(),
        license_id: Some(5),
        user_id: 7,
        plan_id: Some(2),
    });
    let resolver = resolver_with(registry, Some(5)).await;

    let outcome = resolver
        .resolve_manually(PRODUCT, live_url, ManualAction::NewHome)
        .await
        .unwrap();
    assert_eq!(outcome, ManualOutcome::Applied);

    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert_eq!(install.install_id, 999);

    let reports = resolver.registry().reports.lock().unwrap().clone();
    assert_eq!(reports, vec![(999, ReportedOutcome::NewHome)]);
}

#[tokio::test]
async fn new_home_without_remote_record_repoints_install() {
    let resolver = resolver_with(FakeRegistry::default(), None).await;
    let live_url = "https://new-home.example.net";

    let outcome = resolver
        .resolve_manually(PRODUCT, live_url, ManualAction::NewHome)
        .await
        .unwrap();
    assert_eq!(outcome, ManualOutcome::Applied);

    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert_eq!(install.install_id, 100);
    assert_eq!(install.url, live_url);
    assert_eq!(resolver.registry().report_count(), 1);
}

#[tokio::test]
async fn temporary_duplicate_starts_grace_window_without_report() {
    let resolver = resolver_with(FakeRegistry::default(), Some(5)).await;

    let outcome = resolver
        .resolve_manually(
            PRODUCT,
            "https://copy.example.net",
            ManualAction::TemporaryDuplicate,
        )
        .await
        .unwrap();
    assert_eq!(outcome, ManualOutcome::Applied);

    // Freshly selected: the 14-day window has not expired.
    assert!(!resolver
        .has_temporary_duplicate_mode_expired(PRODUCT)
        .await
        .unwrap());

    // Still a clone (no URL rewrite) and nothing reported.
    let install = resolver.database().get_install(PRODUCT).await.unwrap();
    assert_eq!(install.url, STORED_URL);
    assert_eq!(resolver.registry().report_count(), 0);
}
