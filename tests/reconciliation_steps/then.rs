//! Then steps for reconciliation BDD scenarios.

use super::world::ReconciliationWorld;
use rstest_bdd_macros::then;
use tracksync::sync::{
    adapters::memory::{RemoteCall, RemoteOperation},
    domain::{Diagnostic, RemoteId},
};

#[then(r#"the outcome for "{key}" is "{kind}""#)]
fn outcome_for_key(
    world: &ReconciliationWorld,
    key: String,
    kind: String,
) -> Result<(), eyre::Report> {
    let report = world.last_report()?;
    let outcome = report
        .outcomes
        .iter()
        .find(|outcome| outcome.key == key)
        .ok_or_else(|| eyre::eyre!("no outcome for '{key}'"))?;
    if outcome.kind().as_str() != kind {
        return Err(eyre::eyre!(
            "expected '{key}' to be {kind}, found {}",
            outcome.kind()
        ));
    }
    Ok(())
}

#[then(r#"every outcome is "{kind}""#)]
fn every_outcome_is(world: &ReconciliationWorld, kind: String) -> Result<(), eyre::Report> {
    let report = world.last_report()?;
    if let Some(outcome) = report
        .outcomes
        .iter()
        .find(|outcome| outcome.kind().as_str() != kind)
    {
        return Err(eyre::eyre!(
            "expected every outcome to be {kind}, '{}' is {}",
            outcome.key,
            outcome.kind()
        ));
    }
    Ok(())
}

#[then("the tracker received {count:u64} create calls")]
fn tracker_received_creates(world: &ReconciliationWorld, count: u64) -> Result<(), eyre::Report> {
    let received = world.tracker.calls_of(RemoteOperation::CreateItem).len();
    if u64::try_from(received)? != count {
        return Err(eyre::eyre!("expected {count} create calls, found {received}"));
    }
    Ok(())
}

#[then("the last run issued no mutations")]
fn last_run_issued_no_mutations(world: &ReconciliationWorld) -> Result<(), eyre::Report> {
    let mutations = world.tracker.mutation_count();
    if mutations != 0 {
        return Err(eyre::eyre!("expected no mutations, found {mutations}"));
    }
    Ok(())
}

#[then(r#"the update of item {number:u64} changed only "{field}""#)]
fn update_changed_only(
    world: &ReconciliationWorld,
    number: u64,
    field: String,
) -> Result<(), eyre::Report> {
    let target = RemoteId::new(number)?;
    let updates = world.tracker.calls_of(RemoteOperation::UpdateItem);
    let fields = updates
        .iter()
        .find_map(|call| match call {
            RemoteCall::UpdateItem { id, fields } if *id == target => Some(fields),
            _ => None,
        })
        .ok_or_else(|| eyre::eyre!("no update call for item {number}"))?;
    let names: Vec<&str> = fields.iter().map(|changed| changed.as_str()).collect();
    if names != [field.as_str()] {
        return Err(eyre::eyre!("expected only {field} to change, found {names:?}"));
    }
    Ok(())
}

#[then(r#"the report carries a diagnostic for "{key}""#)]
fn report_carries_diagnostic(world: &ReconciliationWorld, key: String) -> Result<(), eyre::Report> {
    let report = world.last_report()?;
    let found = report.diagnostics.iter().any(|diagnostic| match diagnostic {
        Diagnostic::DuplicateRemoteKey { key: found, .. }
        | Diagnostic::AmbiguousMatch { key: found, .. } => *found == key,
    });
    if !found {
        return Err(eyre::eyre!("no diagnostic recorded for '{key}'"));
    }
    Ok(())
}
