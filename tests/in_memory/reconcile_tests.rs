//! Reconciliation runs against the in-memory tracker.

use std::sync::Arc;

use mockable::DefaultClock;
use rstest::rstest;
use tokio_util::sync::CancellationToken;
use tracksync::sync::{
    adapters::{
        InMemoryTracker,
        memory::{FailureRule, RemoteCall, RemoteOperation},
    },
    config::{ReconcileOptions, RetryPolicy, SyncConfig},
    domain::{
        CaseInsensitive, Diagnostic, ItemField, ItemState, OutcomeKind, OutcomeStatus, SkipReason,
    },
    ports::RemoteError,
    services::{IdentityResolver, RenameTable, SyncService, SyncServiceError},
};

use super::helpers::{declared, id, kinds, names, outcome_for, remote, service, tracker};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_items_are_created_once(tracker: InMemoryTracker) -> Result<(), eyre::Report> {
    let items = vec![
        declared("Add retry budget").with_labels(names(&["enhancement"])),
        declared("Document rate limits").with_milestone("v1"),
    ];

    let report = service(&tracker, SyncConfig::default())
        .run(items, CancellationToken::new())
        .await?;

    assert_eq!(kinds(&report), vec![OutcomeKind::Created, OutcomeKind::Created]);
    assert!(report.outcomes.iter().all(|outcome| outcome.remote_id.is_some()));
    assert_eq!(tracker.calls_of(RemoteOperation::CreateItem).len(), 2);
    let created = tracker.items();
    assert_eq!(created.len(), 2);
    let documented = outcome_for(&report, "Document rate limits")?;
    let stored = documented
        .remote_id
        .and_then(|remote_id| tracker.item(remote_id))
        .ok_or_else(|| eyre::eyre!("created item missing from tracker"))?;
    assert_eq!(stored.milestone.as_deref(), Some("v1"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_run_is_unchanged_and_mutation_free(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    let items = vec![
        declared("Add retry budget")
            .with_body("Retry transient failures")
            .with_labels(names(&["enhancement", "sync"]))
            .with_assignees(names(&["alice"]))
            .with_milestone("v1"),
        declared("Retire legacy endpoint").with_state(ItemState::Closed),
    ];
    let service = service(&tracker, SyncConfig::default());

    let first = service.run(items.clone(), CancellationToken::new()).await?;
    assert_eq!(kinds(&first), vec![OutcomeKind::Created, OutcomeKind::Created]);
    tracker.clear_calls();

    let second = service.run(items, CancellationToken::new()).await?;

    assert_eq!(
        kinds(&second),
        vec![OutcomeKind::Unchanged, OutcomeKind::Unchanged]
    );
    assert_eq!(tracker.mutation_count(), 0);
    assert!(second.is_success(false));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn only_differing_fields_are_sent(tracker: InMemoryTracker) -> Result<(), eyre::Report> {
    let mut existing = remote(7, "Add retry budget");
    existing.body = "Retry transient failures".to_owned();
    existing.labels = names(&["enhancement"]).into_iter().collect();
    tracker.insert_item(existing);
    let items = vec![
        declared("Add retry budget")
            .with_body("Retry transient failures")
            .with_labels(names(&["enhancement", "bug"])),
    ];

    let report = service(&tracker, SyncConfig::default())
        .run(items, CancellationToken::new())
        .await?;

    assert_eq!(kinds(&report), vec![OutcomeKind::Updated]);
    let updates = tracker.calls_of(RemoteOperation::UpdateItem);
    let [update] = updates.as_slice() else {
        eyre::bail!("expected one update call, got {updates:?}");
    };
    assert!(matches!(
        update,
        RemoteCall::UpdateItem { id: updated, fields }
            if *updated == id(7) && fields.as_slice() == [ItemField::Labels]
    ));
    let stored = tracker
        .item(id(7))
        .ok_or_else(|| eyre::eyre!("item #7 missing"))?;
    assert!(stored.labels.contains("bug"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_remote_keys_are_never_guessed(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    tracker.insert_item(remote(1, "Alpha"));
    tracker.insert_item(remote(2, "Alpha"));
    let items = vec![declared("Alpha").with_body("changed"), declared("Beta")];

    let report = service(&tracker, SyncConfig::default())
        .run(items, CancellationToken::new())
        .await?;

    let alpha = outcome_for(&report, "Alpha")?;
    assert_eq!(
        alpha.status,
        OutcomeStatus::Skipped {
            reason: SkipReason::Ambiguous {
                candidates: vec![id(1), id(2)],
            },
        }
    );
    assert_eq!(outcome_for(&report, "Beta")?.kind(), OutcomeKind::Created);
    assert!(tracker.calls_of(RemoteOperation::UpdateItem).is_empty());
    assert!(report.diagnostics.iter().any(|diagnostic| matches!(
        diagnostic,
        Diagnostic::DuplicateRemoteKey { key, .. } if key == "Alpha"
    )));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabled_updates_report_without_mutating(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    tracker.insert_item(remote(3, "Add retry budget"));
    let config = SyncConfig {
        reconcile: ReconcileOptions::create_only(),
        ..SyncConfig::default()
    };

    let report = service(&tracker, config)
        .run(
            vec![declared("Add retry budget").with_body("new body")],
            CancellationToken::new(),
        )
        .await?;

    assert_eq!(kinds(&report), vec![OutcomeKind::Skipped]);
    assert_eq!(report.summary().skipped, 1);
    assert_eq!(tracker.mutation_count(), 0);
    assert!(!report.has_failures());
    Ok(())
}

#[rstest]
#[case(false, OutcomeKind::Unchanged)]
#[case(true, OutcomeKind::Updated)]
#[tokio::test(flavor = "multi_thread")]
async fn remote_milestones_are_cleared_only_when_managed(
    tracker: InMemoryTracker,
    #[case] manage_milestone: bool,
    #[case] expected: OutcomeKind,
) -> Result<(), eyre::Report> {
    let mut existing = remote(4, "Add retry budget");
    existing.milestone = Some("v1".to_owned());
    tracker.insert_item(existing);
    let config = SyncConfig {
        reconcile: ReconcileOptions {
            manage_milestone,
            ..ReconcileOptions::default()
        },
        ..SyncConfig::default()
    };

    let report = service(&tracker, config)
        .run(vec![declared("Add retry budget")], CancellationToken::new())
        .await?;

    assert_eq!(kinds(&report), vec![expected]);
    let stored = tracker
        .item(id(4))
        .ok_or_else(|| eyre::eyre!("item #4 missing"))?;
    assert_eq!(stored.milestone.is_none(), manage_milestone);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn confirmed_rename_updates_the_title(tracker: InMemoryTracker) -> Result<(), eyre::Report> {
    tracker.insert_item(remote(5, "Old title"));
    let renames = RenameTable::new().with_rename("Old title", "New title");
    let resolver = IdentityResolver::default().with_renames(renames);

    let report = service(&tracker, SyncConfig::default())
        .with_resolver(resolver)
        .run(vec![declared("New title")], CancellationToken::new())
        .await?;

    assert_eq!(kinds(&report), vec![OutcomeKind::Updated]);
    assert!(tracker.calls_of(RemoteOperation::CreateItem).is_empty());
    let stored = tracker
        .item(id(5))
        .ok_or_else(|| eyre::eyre!("item #5 missing"))?;
    assert_eq!(stored.key, "New title");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rename_colliding_with_a_declared_key_touches_nothing(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    let mut existing = remote(1, "Old");
    existing.body = "original".to_owned();
    tracker.insert_item(existing);
    let resolver =
        IdentityResolver::default().with_renames(RenameTable::new().with_rename("Old", "New"));

    let report = service(&tracker, SyncConfig::default())
        .with_resolver(resolver)
        .run(
            vec![
                declared("Old").with_body("from old"),
                declared("New").with_body("from new"),
            ],
            CancellationToken::new(),
        )
        .await?;

    let shared = OutcomeStatus::Skipped {
        reason: SkipReason::Ambiguous {
            candidates: vec![id(1)],
        },
    };
    assert!(report.outcomes.iter().all(|outcome| outcome.status == shared));
    assert_eq!(report.diagnostics.len(), 2);
    assert_eq!(tracker.mutation_count(), 0);
    let stored = tracker
        .item(id(1))
        .ok_or_else(|| eyre::eyre!("item #1 missing"))?;
    assert_eq!(stored.body, "original");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn case_insensitive_matching_leaves_titles_alone(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    let mut existing = remote(6, "fix login redirect");
    existing.labels = names(&["Bug"]).into_iter().collect();
    tracker.insert_item(existing);
    let resolver = IdentityResolver::new(Arc::new(CaseInsensitive));

    let report = service(&tracker, SyncConfig::default())
        .with_resolver(resolver)
        .run(
            vec![declared("Fix Login Redirect").with_labels(names(&["bug"]))],
            CancellationToken::new(),
        )
        .await?;

    assert_eq!(kinds(&report), vec![OutcomeKind::Unchanged]);
    assert_eq!(tracker.mutation_count(), 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_declared_keys_reject_the_run(tracker: InMemoryTracker) {
    let result = service(&tracker, SyncConfig::default())
        .run(
            vec![declared("Alpha"), declared("Beta"), declared("Alpha")],
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(SyncServiceError::Store(_))));
    assert!(tracker.calls().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listing_reads_every_page_before_processing() -> Result<(), eyre::Report> {
    let tracker = InMemoryTracker::new()
        .with_page_size(2)
        .with_items((1..=5).map(|n| remote(n, &format!("Item {n}"))));
    let items = (1..=5).map(|n| declared(&format!("Item {n}"))).collect();

    let report = service(&tracker, SyncConfig::default())
        .run(items, CancellationToken::new())
        .await?;

    assert!(kinds(&report).iter().all(|kind| *kind == OutcomeKind::Unchanged));
    assert_eq!(tracker.calls_of(RemoteOperation::ListItems).len(), 3);
    assert_eq!(tracker.mutation_count(), 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listing_failure_aborts_before_any_mutation(tracker: InMemoryTracker) {
    tracker.inject(FailureRule::new(
        RemoteOperation::ListItems,
        RemoteError::validation("bad query"),
    ));

    let result = service(&tracker, SyncConfig::default())
        .run(vec![declared("Alpha")], CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SyncServiceError::Listing(_))));
    assert_eq!(tracker.mutation_count(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn per_item_failures_do_not_stop_other_items(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    tracker.inject(
        FailureRule::new(RemoteOperation::CreateItem, RemoteError::validation("label unknown"))
            .for_subject("Beta"),
    );

    let report = service(&tracker, SyncConfig::default())
        .run(
            vec![declared("Alpha"), declared("Beta"), declared("Gamma")],
            CancellationToken::new(),
        )
        .await?;

    assert_eq!(
        kinds(&report),
        vec![OutcomeKind::Created, OutcomeKind::Failed, OutcomeKind::Created]
    );
    assert_eq!(report.summary().failed, 1);
    assert!(!report.is_success(false));
    assert!(report.is_success(true));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_absorbed_by_retries(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    tracker.inject(
        FailureRule::new(RemoteOperation::CreateItem, RemoteError::transient("503")).times(2),
    );
    let config = SyncConfig {
        retry: RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2,
        },
        ..SyncConfig::default()
    };
    let service = SyncService::with_retries(tracker.clone(), Arc::new(DefaultClock), config);

    let report = service
        .run(vec![declared("Alpha")], CancellationToken::new())
        .await?;

    assert_eq!(kinds(&report), vec![OutcomeKind::Created]);
    assert_eq!(tracker.calls_of(RemoteOperation::CreateItem).len(), 3);
    assert_eq!(tracker.items().len(), 1);
    Ok(())
}
