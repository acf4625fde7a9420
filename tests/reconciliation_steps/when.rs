//! When steps for reconciliation BDD scenarios.

use super::world::{ReconciliationWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use tokio_util::sync::CancellationToken;

fn reconcile(world: &mut ReconciliationWorld) -> Result<(), eyre::Report> {
    world.tracker.clear_calls();
    let service = world.service();
    let report = run_async(service.run(world.declared.clone(), CancellationToken::new()))
        .wrap_err("reconciliation run")?;
    world.reports.push(report);
    Ok(())
}

#[when("the declared items are reconciled")]
fn declared_items_reconciled(world: &mut ReconciliationWorld) -> Result<(), eyre::Report> {
    reconcile(world)
}

#[when("the declared items are reconciled again")]
fn declared_items_reconciled_again(world: &mut ReconciliationWorld) -> Result<(), eyre::Report> {
    if world.reports.is_empty() {
        return Err(eyre::eyre!("expected an earlier run before reconciling again"));
    }
    reconcile(world)
}
