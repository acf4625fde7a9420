//! Orchestration of complete forward and reverse synchronization runs.

use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::{
    control::{CallError, RunControl},
    engine::ReconciliationEngine,
    export::ExportTranslator,
    resolver::IdentityResolver,
    snapshot::RemoteSnapshot,
};
use crate::sync::{
    adapters::RetryingTracker,
    config::SyncConfig,
    domain::{
        DeclaredItem, DeclaredItemStore, DeclaredItemStoreError, ExportFilter, HaltReason,
        ItemPredicate, OutcomeStatus, ReconciliationOutcome, ReconciliationReport, RunId,
        SkipReason,
    },
    ports::{ItemQuery, RemoteError, RemoteTracker},
};

/// Run-level failures. Per-item failures are reported as outcomes instead.
#[derive(Debug, Error)]
pub enum SyncServiceError {
    /// The declared input violates a structural invariant.
    #[error(transparent)]
    Store(#[from] DeclaredItemStoreError),
    /// The remote snapshot could not be listed.
    #[error("remote listing failed: {0}")]
    Listing(#[from] RemoteError),
    /// An export halted before the listing was complete.
    #[error("run halted before processing: {0}")]
    Halted(HaltReason),
}

impl From<CallError> for SyncServiceError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Remote(remote) => Self::Listing(remote),
            CallError::Halted(reason) => Self::Halted(reason),
        }
    }
}

/// Result type for synchronization service operations.
pub type SyncServiceResult<T> = Result<T, SyncServiceError>;

/// Synchronization service wiring snapshot, resolution and reconciliation.
#[derive(Clone)]
pub struct SyncService<T, C>
where
    T: RemoteTracker + ?Sized,
    C: Clock + Send + Sync,
{
    tracker: Arc<T>,
    clock: Arc<C>,
    config: SyncConfig,
    resolver: IdentityResolver,
}

impl<T, C> SyncService<T, C>
where
    T: RemoteTracker + ?Sized,
    C: Clock + Send + Sync,
{
    /// Creates a service with exact key matching.
    #[must_use]
    pub fn new(tracker: Arc<T>, clock: Arc<C>, config: SyncConfig) -> Self {
        Self {
            tracker,
            clock,
            config,
            resolver: IdentityResolver::default(),
        }
    }

    /// Replaces the identity resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Converges the remote tracker towards `items`.
    ///
    /// The remote listing is fully read before any item is processed.
    /// Cancelling `cancellation` stops new remote calls; items without a
    /// terminal outcome are then reported as skipped. This includes a halt
    /// before or during the listing, in which case every item is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncServiceError::Store`] for duplicate declared keys and
    /// [`SyncServiceError::Listing`] when the remote rejects the listing.
    #[instrument(skip(self, items, cancellation), fields(items = items.len()))]
    pub async fn run(
        &self,
        items: Vec<DeclaredItem>,
        cancellation: CancellationToken,
    ) -> SyncServiceResult<ReconciliationReport> {
        let run_id = RunId::new();
        let started_at = self.clock.utc();
        let equivalence = self.resolver.equivalence();
        let store = DeclaredItemStore::new(items, &*equivalence)?;
        info!(%run_id, declared = store.len(), "starting reconciliation run");

        let control = RunControl::new(
            Arc::clone(&self.clock),
            self.config.rate_limit,
            cancellation,
        );
        let listing =
            RemoteSnapshot::fetch(&*self.tracker, &control, &*self.clock, &ItemQuery::all()).await;
        let snapshot = match listing {
            Ok(snapshot) => snapshot,
            Err(CallError::Halted(reason)) => {
                warn!(%run_id, %reason, "run halted before the listing completed");
                return Ok(self.halted_report(run_id, &store, reason, started_at));
            }
            Err(CallError::Remote(err)) => return Err(SyncServiceError::Listing(err)),
        };
        let matches = self.resolver.resolve(&store, snapshot.items());

        let engine = ReconciliationEngine::new(
            Arc::clone(&self.tracker),
            equivalence,
            self.config.reconcile,
            self.config.publication.clone(),
        );
        let outcomes = engine
            .reconcile(&store, snapshot.items(), &matches, &control)
            .await;

        let report = ReconciliationReport {
            run_id,
            outcomes,
            diagnostics: matches.diagnostics().to_vec(),
            started_at,
            finished_at: self.clock.utc(),
        };
        info!(
            %run_id,
            summary = %report.summary(),
            diagnostics = report.diagnostics.len(),
            "reconciliation run finished"
        );
        Ok(report)
    }

    fn halted_report(
        &self,
        run_id: RunId,
        store: &DeclaredItemStore,
        reason: HaltReason,
        started_at: DateTime<Utc>,
    ) -> ReconciliationReport {
        let outcomes = store
            .iter()
            .enumerate()
            .map(|(position, item)| {
                ReconciliationOutcome::new(
                    position,
                    item.key(),
                    None,
                    OutcomeStatus::Skipped {
                        reason: SkipReason::Halted(reason),
                    },
                )
            })
            .collect();
        ReconciliationReport {
            run_id,
            outcomes,
            diagnostics: Vec::new(),
            started_at,
            finished_at: self.clock.utc(),
        }
    }

    /// Exports remote items selected by `filter` as declared items.
    ///
    /// The listing is narrowed server-side by the same criteria.
    ///
    /// # Errors
    ///
    /// Returns [`SyncServiceError::Listing`] or [`SyncServiceError::Halted`]
    /// when the listing cannot be read.
    pub async fn export(
        &self,
        filter: &ExportFilter,
        cancellation: CancellationToken,
    ) -> SyncServiceResult<Vec<DeclaredItem>> {
        self.export_matching(&ItemQuery::from(filter), filter, cancellation)
            .await
    }

    /// Exports items from the `query` listing that satisfy `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncServiceError::Listing`] or [`SyncServiceError::Halted`]
    /// when the listing cannot be read.
    #[instrument(skip(self, predicate, cancellation))]
    pub async fn export_matching<P>(
        &self,
        query: &ItemQuery,
        predicate: &P,
        cancellation: CancellationToken,
    ) -> SyncServiceResult<Vec<DeclaredItem>>
    where
        P: ItemPredicate + ?Sized,
    {
        let control = RunControl::new(
            Arc::clone(&self.clock),
            self.config.rate_limit,
            cancellation,
        );
        let snapshot = RemoteSnapshot::fetch(&*self.tracker, &control, &*self.clock, query).await?;
        let exported = ExportTranslator::new().export(snapshot.items(), predicate);
        info!(
            listed = snapshot.items().len(),
            exported = exported.len(),
            "export finished"
        );
        Ok(exported)
    }
}

impl<U, C> SyncService<RetryingTracker<U>, C>
where
    U: RemoteTracker,
    C: Clock + Send + Sync,
{
    /// Creates a service whose tracker retries transient failures with the
    /// configured [`RetryPolicy`](crate::sync::config::RetryPolicy).
    #[must_use]
    pub fn with_retries(tracker: U, clock: Arc<C>, config: SyncConfig) -> Self {
        let retrying = RetryingTracker::new(tracker, config.retry);
        Self::new(Arc::new(retrying), clock, config)
    }
}
