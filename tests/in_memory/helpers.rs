//! Shared test helpers for in-memory synchronization tests.

use std::sync::Arc;

use chrono::Utc;
use mockable::DefaultClock;
use rstest::fixture;
use tracksync::sync::{
    adapters::InMemoryTracker,
    config::SyncConfig,
    domain::{
        DeclaredItem, OutcomeKind, ReconciliationOutcome, ReconciliationReport, RemoteId,
        RemoteItem,
    },
    services::SyncService,
};

/// Service type used across in-memory tests.
pub type TestService = SyncService<InMemoryTracker, DefaultClock>;

/// Provides a fresh, empty tracker for each test.
#[fixture]
pub fn tracker() -> InMemoryTracker {
    InMemoryTracker::new()
}

/// Builds a service sharing state with `tracker`.
pub fn service(tracker: &InMemoryTracker, config: SyncConfig) -> TestService {
    SyncService::new(Arc::new(tracker.clone()), Arc::new(DefaultClock), config)
}

/// Builds a remote identifier.
///
/// # Panics
///
/// Panics if `value` is zero.
pub fn id(value: u64) -> RemoteId {
    RemoteId::new(value).expect("valid remote id")
}

/// Builds a declared item with the given key.
///
/// # Panics
///
/// Panics if `key` is blank.
pub fn declared(key: &str) -> DeclaredItem {
    DeclaredItem::new(key).expect("valid declared item")
}

/// Builds an open remote item with no labels.
pub fn remote(value: u64, key: &str) -> RemoteItem {
    RemoteItem::new(id(value), key, Utc::now())
}

/// Converts string literals into owned names.
pub fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

/// Returns the outcome kinds of `report` in declared order.
pub fn kinds(report: &ReconciliationReport) -> Vec<OutcomeKind> {
    report
        .outcomes
        .iter()
        .map(ReconciliationOutcome::kind)
        .collect()
}

/// Returns the outcome for `key`.
///
/// # Errors
///
/// Returns an error if no outcome carries `key`.
pub fn outcome_for<'a>(
    report: &'a ReconciliationReport,
    key: &str,
) -> Result<&'a ReconciliationOutcome, eyre::Report> {
    report
        .outcomes
        .iter()
        .find(|outcome| outcome.key == key)
        .ok_or_else(|| eyre::eyre!("no outcome for '{key}'"))
}
