//! Fatal abort, cancellation and rate-limit behaviour across whole runs.

use std::time::Duration;

use chrono::Utc;
use rstest::rstest;
use tokio_util::sync::CancellationToken;
use tracksync::sync::{
    adapters::{
        InMemoryTracker,
        memory::{FailureRule, RemoteOperation},
    },
    config::SyncConfig,
    domain::{DeclaredItem, FailureReason, HaltReason, OutcomeKind, OutcomeStatus, SkipReason},
    ports::RemoteError,
    services::SyncServiceError,
};

use super::helpers::{declared, kinds, service, tracker};

fn five_items() -> Vec<DeclaredItem> {
    (1..=5).map(|n| declared(&format!("Item {n}"))).collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn auth_failure_aborts_the_remaining_items(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    tracker.inject(
        FailureRule::new(RemoteOperation::CreateItem, RemoteError::auth("token revoked"))
            .for_subject("Item 3"),
    );

    let report = service(&tracker, SyncConfig::default())
        .run(five_items(), CancellationToken::new())
        .await?;

    let aborted = OutcomeStatus::Skipped {
        reason: SkipReason::Halted(HaltReason::RunAborted),
    };
    let statuses: Vec<&OutcomeStatus> = report.outcomes.iter().map(|o| &o.status).collect();
    assert_eq!(
        statuses,
        vec![
            &OutcomeStatus::Created,
            &OutcomeStatus::Created,
            &OutcomeStatus::Failed {
                reason: FailureReason::Unauthorized {
                    message: "token revoked".to_owned(),
                },
            },
            &aborted,
            &aborted,
        ]
    );
    assert_eq!(tracker.calls_of(RemoteOperation::CreateItem).len(), 3);
    assert_eq!(tracker.items().len(), 2);
    assert!(report.has_failures());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancellation_before_the_run_skips_every_item(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    let token = CancellationToken::new();
    token.cancel();

    let report = service(&tracker, SyncConfig::default())
        .run(five_items(), token)
        .await?;

    let cancelled = OutcomeStatus::Skipped {
        reason: SkipReason::Halted(HaltReason::Cancelled),
    };
    let keys: Vec<&str> = report.outcomes.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["Item 1", "Item 2", "Item 3", "Item 4", "Item 5"]);
    assert!(report.outcomes.iter().all(|o| o.status == cancelled));
    assert!(tracker.calls().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancellation_while_listing_is_suspended_skips_every_item(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    tracker.inject(FailureRule::new(
        RemoteOperation::ListItems,
        RemoteError::rate_limited(Utc::now() + chrono::Duration::hours(1)),
    ));
    let token = CancellationToken::new();
    let service = service(&tracker, SyncConfig::default());

    let cancel_later = async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(service.run(five_items(), token.clone()), cancel_later);
    let report = result?;

    assert_eq!(report.outcomes.len(), 5);
    assert!(report.outcomes.iter().all(|o| {
        o.remote_id.is_none()
            && o.status
                == OutcomeStatus::Skipped {
                    reason: SkipReason::Halted(HaltReason::Cancelled),
                }
    }));
    assert_eq!(tracker.calls_of(RemoteOperation::ListItems).len(), 1);
    assert_eq!(tracker.mutation_count(), 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_listing_credentials_fail_the_run(tracker: InMemoryTracker) {
    tracker.inject(FailureRule::new(
        RemoteOperation::ListItems,
        RemoteError::auth("token revoked"),
    ));

    let result = service(&tracker, SyncConfig::default())
        .run(five_items(), CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(SyncServiceError::Listing(RemoteError::Auth { .. }))
    ));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancellation_during_a_suspension_skips_unfinished_items(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    tracker.inject(
        FailureRule::new(
            RemoteOperation::CreateItem,
            RemoteError::rate_limited(Utc::now() + chrono::Duration::hours(1)),
        )
        .for_subject("Item 2"),
    );
    let token = CancellationToken::new();
    let service = service(&tracker, SyncConfig::default());

    let cancel_later = async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(service.run(five_items(), token.clone()), cancel_later);
    let report = result?;

    let cancelled = OutcomeStatus::Skipped {
        reason: SkipReason::Halted(HaltReason::Cancelled),
    };
    assert_eq!(report.outcomes.first().map(|o| o.kind()), Some(OutcomeKind::Created));
    assert!(report.outcomes.iter().skip(1).all(|o| o.status == cancelled));
    assert_eq!(tracker.items().len(), 1);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rate_limited_run_resumes_and_completes(
    tracker: InMemoryTracker,
) -> Result<(), eyre::Report> {
    tracker.inject(
        FailureRule::new(
            RemoteOperation::CreateItem,
            RemoteError::rate_limited(Utc::now() + chrono::Duration::seconds(30)),
        )
        .for_subject("Item 2")
        .times(1),
    );
    let started = tokio::time::Instant::now();

    let report = service(&tracker, SyncConfig::default())
        .run(five_items(), CancellationToken::new())
        .await?;

    assert!(kinds(&report).iter().all(|kind| *kind == OutcomeKind::Created));
    assert_eq!(tracker.calls_of(RemoteOperation::CreateItem).len(), 6);
    assert!(started.elapsed() >= Duration::from_secs(25));
    Ok(())
}
