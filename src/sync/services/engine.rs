//! Per-item reconciliation of declared state against a remote snapshot.

use futures::stream::{self, StreamExt};
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    control::{CallError, RunControl},
    publisher::ArtifactPublisher,
    resolver::{MatchTable, Resolution},
};
use crate::sync::{
    config::{PublicationConfig, ReconcileOptions},
    domain::{
        DeclaredItem, DeclaredItemStore, DiffPolicy, FailureReason, ItemChanges, ItemState,
        KeyEquivalence, OutcomeKind, OutcomeStatus, ReconciliationOutcome, RemoteId, RemoteItem,
        SkipReason,
    },
    ports::{NewItem, RemoteTracker},
};

/// Converges remote items towards their declarations.
///
/// Items are independent: each one is diffed against the read-only
/// snapshot and match table, and up to
/// [`ReconcileOptions::max_concurrency`] items are in flight at once.
/// Outcomes are returned in declared order whatever the completion order.
pub struct ReconciliationEngine<T>
where
    T: RemoteTracker + ?Sized,
{
    tracker: Arc<T>,
    publisher: ArtifactPublisher<T>,
    equivalence: Arc<dyn KeyEquivalence>,
    options: ReconcileOptions,
}

impl<T> ReconciliationEngine<T>
where
    T: RemoteTracker + ?Sized,
{
    /// Creates an engine.
    #[must_use]
    pub fn new(
        tracker: Arc<T>,
        equivalence: Arc<dyn KeyEquivalence>,
        options: ReconcileOptions,
        publication: PublicationConfig,
    ) -> Self {
        let publisher = ArtifactPublisher::new(Arc::clone(&tracker), publication);
        Self {
            tracker,
            publisher,
            equivalence,
            options,
        }
    }

    /// Returns the reconciliation options.
    #[must_use]
    pub const fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconciles every declared item and returns one outcome per item.
    ///
    /// Items still waiting when the run is cancelled or aborted are
    /// reported as skipped with the halt reason.
    pub async fn reconcile<C>(
        &self,
        store: &DeclaredItemStore,
        snapshot: &[RemoteItem],
        matches: &MatchTable,
        control: &RunControl<C>,
    ) -> Vec<ReconciliationOutcome>
    where
        C: Clock + Send + Sync,
    {
        stream::iter(store.iter().enumerate())
            .map(|(position, item)| {
                let resolution = matches.resolution(position);
                self.reconcile_item(position, item, resolution, snapshot, control)
            })
            .buffered(self.options.concurrency())
            .collect()
            .await
    }

    async fn reconcile_item<C>(
        &self,
        position: usize,
        item: &DeclaredItem,
        resolution: Option<&Resolution>,
        snapshot: &[RemoteItem],
        control: &RunControl<C>,
    ) -> ReconciliationOutcome
    where
        C: Clock + Send + Sync,
    {
        let matched = match resolution {
            Some(Resolution::Matched(index)) => snapshot.get(*index),
            _ => None,
        };

        if let Some(reason) = control.halt_reason() {
            let status = OutcomeStatus::Skipped {
                reason: SkipReason::Halted(reason),
            };
            return ReconciliationOutcome::new(
                position,
                item.key(),
                matched.map(|remote| remote.remote_id),
                status,
            );
        }

        let (remote_id, status) = match (resolution, matched) {
            (Some(Resolution::Ambiguous(candidates)), _) => {
                let status = OutcomeStatus::Skipped {
                    reason: SkipReason::Ambiguous {
                        candidates: candidates.clone(),
                    },
                };
                (None, status)
            }
            (Some(Resolution::Unmatched), _) => self.create(item, control).await,
            (Some(Resolution::Matched(_)), Some(remote)) => {
                (Some(remote.remote_id), self.converge(item, remote, control).await)
            }
            (Some(Resolution::Matched(_)), None) | (None, _) => {
                let status = OutcomeStatus::Failed {
                    reason: FailureReason::StaleReference {
                        resource: format!("snapshot entry for declared item {position}"),
                    },
                };
                (None, status)
            }
        };

        let mut outcome = ReconciliationOutcome::new(position, item.key(), remote_id, status);
        if let Some(id) = remote_id.filter(|_| self.should_publish(item, outcome.kind())) {
            outcome.publication = Some(self.publisher.publish(item, id, control).await);
        }
        outcome
    }

    fn should_publish(&self, item: &DeclaredItem, kind: OutcomeKind) -> bool {
        self.options.publish_artifacts
            && !item.artifacts().is_empty()
            && matches!(
                kind,
                OutcomeKind::Created | OutcomeKind::Updated | OutcomeKind::Unchanged
            )
    }

    async fn create<C>(
        &self,
        item: &DeclaredItem,
        control: &RunControl<C>,
    ) -> (Option<RemoteId>, OutcomeStatus)
    where
        C: Clock + Send + Sync,
    {
        let request = NewItem::from(item);
        let created = match control.call(|| self.tracker.create_item(&request)).await {
            Ok(created) => created,
            Err(err) => return (None, failure_status(item, err)),
        };
        let remote_id = created.remote_id;
        info!(key = %item.key(), %remote_id, "created remote item");

        if item.state() == ItemState::Closed && created.state != ItemState::Closed {
            let close = ItemChanges::state_only(ItemState::Closed);
            if let Err(err) = control
                .call(|| self.tracker.update_item(remote_id, &close))
                .await
            {
                warn!(key = %item.key(), %remote_id, error = ?err, "closing created item failed");
                let status = OutcomeStatus::Failed {
                    reason: FailureReason::from(err),
                };
                return (Some(remote_id), status);
            }
        }
        (Some(remote_id), OutcomeStatus::Created)
    }

    async fn converge<C>(
        &self,
        item: &DeclaredItem,
        remote: &RemoteItem,
        control: &RunControl<C>,
    ) -> OutcomeStatus
    where
        C: Clock + Send + Sync,
    {
        let policy = DiffPolicy {
            manage_milestone: self.options.manage_milestone,
        };
        let changes = ItemChanges::between(item, remote, &*self.equivalence, policy);
        let remote_id = remote.remote_id;
        if changes.is_empty() {
            debug!(key = %item.key(), %remote_id, "remote item up to date");
            return OutcomeStatus::Unchanged;
        }
        if !self.options.allow_update {
            info!(key = %item.key(), %remote_id, %changes, "update skipped, updates disabled");
            return OutcomeStatus::Skipped {
                reason: SkipReason::UpdatesDisabled { changes },
            };
        }

        let result = control
            .call(|| self.tracker.update_item(remote_id, &changes))
            .await;
        match result {
            Ok(_) => {
                info!(key = %item.key(), %remote_id, %changes, "updated remote item");
                OutcomeStatus::Updated { changes }
            }
            Err(err) => failure_status(item, err),
        }
    }
}

/// Maps a call failure to the item's status; a halted call leaves the item
/// without a terminal remote effect, so it is skipped.
fn failure_status(item: &DeclaredItem, err: CallError) -> OutcomeStatus {
    match err {
        CallError::Halted(reason) => OutcomeStatus::Skipped {
            reason: SkipReason::Halted(reason),
        },
        CallError::Remote(remote) => {
            warn!(key = %item.key(), error = %remote, "remote call failed");
            OutcomeStatus::Failed {
                reason: remote.into(),
            }
        }
    }
}
