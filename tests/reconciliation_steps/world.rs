//! Shared world state for reconciliation BDD scenarios.

use std::sync::Arc;

use mockable::DefaultClock;
use rstest::fixture;
use tracksync::sync::{
    adapters::InMemoryTracker,
    config::SyncConfig,
    domain::{DeclaredItem, ReconciliationReport},
    services::SyncService,
};

/// Service type used by the BDD world.
pub type TestSyncService = SyncService<InMemoryTracker, DefaultClock>;

/// Scenario world for reconciliation behaviour tests.
pub struct ReconciliationWorld {
    pub tracker: InMemoryTracker,
    pub config: SyncConfig,
    pub declared: Vec<DeclaredItem>,
    pub reports: Vec<ReconciliationReport>,
}

impl ReconciliationWorld {
    /// Creates a world with an empty tracker and no declared items.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracker: InMemoryTracker::new(),
            config: SyncConfig::default(),
            declared: Vec::new(),
            reports: Vec::new(),
        }
    }

    /// Builds a service over the world's tracker.
    #[must_use]
    pub fn service(&self) -> TestSyncService {
        SyncService::new(
            Arc::new(self.tracker.clone()),
            Arc::new(DefaultClock),
            self.config.clone(),
        )
    }

    /// Returns the report of the most recent run.
    ///
    /// # Errors
    ///
    /// Returns an error if no run has completed yet.
    pub fn last_report(&self) -> Result<&ReconciliationReport, eyre::Report> {
        self.reports
            .last()
            .ok_or_else(|| eyre::eyre!("no reconciliation run in scenario world"))
    }
}

impl Default for ReconciliationWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ReconciliationWorld {
    ReconciliationWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
