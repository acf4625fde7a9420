//! Given steps for reconciliation BDD scenarios.

use super::world::ReconciliationWorld;
use chrono::Utc;
use eyre::WrapErr;
use rstest_bdd_macros::given;
use tracksync::sync::{
    adapters::memory::{FailureRule, RemoteOperation},
    domain::{DeclaredItem, RemoteId, RemoteItem},
    ports::RemoteError,
};

fn split_labels(labels: &str) -> Vec<String> {
    labels
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[given("an empty tracker")]
fn empty_tracker(world: &mut ReconciliationWorld) {
    world.tracker.clear_calls();
}

#[given(r#"the tracker holds item {number:u64} "{key}" labelled "{labels}""#)]
fn tracker_holds_item(
    world: &mut ReconciliationWorld,
    number: u64,
    key: String,
    labels: String,
) -> Result<(), eyre::Report> {
    let remote_id = RemoteId::new(number).wrap_err("seed remote item identifier")?;
    let mut item = RemoteItem::new(remote_id, key, Utc::now());
    item.labels = split_labels(&labels).into_iter().collect();
    world.tracker.insert_item(item);
    Ok(())
}

#[given(r#"the tracker rejects credentials when creating "{key}""#)]
fn tracker_rejects_credentials(world: &mut ReconciliationWorld, key: String) {
    world.tracker.inject(
        FailureRule::new(RemoteOperation::CreateItem, RemoteError::auth("bad credentials"))
            .for_subject(key),
    );
}

#[given(r#"a declared item "{key}" labelled "{labels}""#)]
fn declared_item(
    world: &mut ReconciliationWorld,
    key: String,
    labels: String,
) -> Result<(), eyre::Report> {
    let item = DeclaredItem::new(key)
        .wrap_err("declare item")?
        .with_labels(split_labels(&labels));
    world.declared.push(item);
    Ok(())
}
