//! Artifact publication exercised through complete reconciliation runs.

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;
use tracksync::sync::{
    adapters::{
        InMemoryTracker,
        memory::{FailureRule, RemoteOperation},
    },
    config::{ReconcileOptions, SyncConfig},
    domain::{
        Artifact, DeclaredItem, OutcomeKind, PublicationResult, PublicationStep,
        ReconciliationOutcome,
    },
    ports::RemoteError,
};

use super::helpers::{declared, outcome_for, remote, service, tracker};

#[fixture]
fn publishing() -> SyncConfig {
    SyncConfig {
        reconcile: ReconcileOptions {
            publish_artifacts: true,
            ..ReconcileOptions::default()
        },
        ..SyncConfig::default()
    }
}

fn with_design_doc(key: &str) -> DeclaredItem {
    declared(key)
        .with_labels(vec!["docs".to_owned()])
        .with_artifact(Artifact::new("docs/design.md", "# Design\n"))
        .with_artifact(Artifact::new("docs/plan.md", "# Plan\n"))
}

fn publication(outcome: &ReconciliationOutcome) -> Result<&PublicationResult, eyre::Report> {
    outcome
        .publication
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no publication recorded for '{}'", outcome.key))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn created_item_gets_a_linked_pull_request(
    tracker: InMemoryTracker,
    publishing: SyncConfig,
) -> Result<(), eyre::Report> {
    let report = service(&tracker, publishing)
        .run(vec![with_design_doc("Write design doc")], CancellationToken::new())
        .await?;

    let outcome = outcome_for(&report, "Write design doc")?;
    assert_eq!(outcome.kind(), OutcomeKind::Created);
    let remote_id = outcome
        .remote_id
        .ok_or_else(|| eyre::eyre!("created item has no identifier"))?;
    let PublicationResult::Published(done) = publication(outcome)? else {
        eyre::bail!("publication failed: {:?}", outcome.publication);
    };
    assert_eq!(
        done.branch.as_str(),
        format!("feature/{remote_id}-write-design-doc")
    );
    assert_eq!(done.committed_paths.len(), 2);

    let pull_requests = tracker.pull_requests();
    let [record] = pull_requests.as_slice() else {
        eyre::bail!("expected one pull request, got {pull_requests:?}");
    };
    assert_eq!(record.request.body, format!("Closes #{remote_id}"));
    assert_eq!(record.request.head, done.branch);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_publication_resumes_on_the_next_run(
    tracker: InMemoryTracker,
    publishing: SyncConfig,
) -> Result<(), eyre::Report> {
    tracker.inject(
        FailureRule::new(RemoteOperation::CommitFile, RemoteError::transient("502"))
            .for_subject("docs/plan.md")
            .times(1),
    );
    let service = service(&tracker, publishing);
    let items = vec![with_design_doc("Write design doc")];

    let first = service.run(items.clone(), CancellationToken::new()).await?;
    let first_outcome = outcome_for(&first, "Write design doc")?;
    assert_eq!(first_outcome.kind(), OutcomeKind::Created);
    let failure = publication(first_outcome)?
        .failure()
        .ok_or_else(|| eyre::eyre!("expected the first publication to fail"))?;
    assert_eq!(failure.step, PublicationStep::CommitArtifacts);
    assert_eq!(first.summary().publication_failures, 1);
    assert!(first.has_failures());

    let second = service.run(items, CancellationToken::new()).await?;
    let second_outcome = outcome_for(&second, "Write design doc")?;
    assert_eq!(second_outcome.kind(), OutcomeKind::Unchanged);
    let PublicationResult::Published(done) = publication(second_outcome)? else {
        eyre::bail!("resumed publication failed: {:?}", second_outcome.publication);
    };
    assert!(done.reused_branch);
    assert!(!done.reused_pull_request);
    assert_eq!(
        done.committed_paths
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        vec!["docs/plan.md".to_owned()]
    );
    assert_eq!(tracker.items().len(), 1);
    assert_eq!(tracker.pull_requests().len(), 1);
    assert!(!second.has_failures());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn publication_is_off_by_default(tracker: InMemoryTracker) -> Result<(), eyre::Report> {
    let report = service(&tracker, SyncConfig::default())
        .run(vec![with_design_doc("Write design doc")], CancellationToken::new())
        .await?;

    let outcome = outcome_for(&report, "Write design doc")?;
    assert!(outcome.publication.is_none());
    assert!(tracker.calls_of(RemoteOperation::CreateRef).is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn skipped_items_are_not_published(
    tracker: InMemoryTracker,
    publishing: SyncConfig,
) -> Result<(), eyre::Report> {
    tracker.insert_item(remote(9, "Write design doc"));
    let config = SyncConfig {
        reconcile: ReconcileOptions {
            allow_update: false,
            ..publishing.reconcile
        },
        ..publishing
    };

    let report = service(&tracker, config)
        .run(vec![with_design_doc("Write design doc")], CancellationToken::new())
        .await?;

    let outcome = outcome_for(&report, "Write design doc")?;
    assert_eq!(outcome.kind(), OutcomeKind::Skipped);
    assert!(outcome.publication.is_none());
    assert_eq!(tracker.mutation_count(), 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn items_without_artifacts_skip_publication(
    tracker: InMemoryTracker,
    publishing: SyncConfig,
) -> Result<(), eyre::Report> {
    let report = service(&tracker, publishing)
        .run(vec![declared("Plain issue")], CancellationToken::new())
        .await?;

    assert!(outcome_for(&report, "Plain issue")?.publication.is_none());
    assert!(tracker.pull_requests().is_empty());
    Ok(())
}
