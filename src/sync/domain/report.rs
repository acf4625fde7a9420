//! Aggregated result of one reconciliation run.

use super::{Diagnostic, OutcomeKind, ReconciliationOutcome, RunId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Outcome counts per tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    /// Items created.
    pub created: usize,
    /// Items updated.
    pub updated: usize,
    /// Items left untouched.
    pub unchanged: usize,
    /// Items skipped.
    pub skipped: usize,
    /// Items failed.
    pub failed: usize,
    /// Publications that failed, independent of the item tag.
    pub publication_failures: usize,
}

impl OutcomeSummary {
    /// Returns the number of counted items.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.skipped + self.failed
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} skipped, {} failed",
            self.created, self.updated, self.unchanged, self.skipped, self.failed
        )
    }
}

/// Ordered per-item outcomes plus run-level diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Run identifier.
    pub run_id: RunId,
    /// One outcome per declared item, in declared order.
    pub outcomes: Vec<ReconciliationOutcome>,
    /// Data-quality findings.
    pub diagnostics: Vec<Diagnostic>,
    /// Run start time.
    pub started_at: DateTime<Utc>,
    /// Run completion time.
    pub finished_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Counts outcomes by tag.
    #[must_use]
    pub fn summary(&self) -> OutcomeSummary {
        self.outcomes
            .iter()
            .fold(OutcomeSummary::default(), |mut summary, outcome| {
                match outcome.kind() {
                    OutcomeKind::Created => summary.created += 1,
                    OutcomeKind::Updated => summary.updated += 1,
                    OutcomeKind::Unchanged => summary.unchanged += 1,
                    OutcomeKind::Skipped => summary.skipped += 1,
                    OutcomeKind::Failed => summary.failed += 1,
                }
                if outcome
                    .publication
                    .as_ref()
                    .is_some_and(|publication| !publication.is_published())
                {
                    summary.publication_failures += 1;
                }
                summary
            })
    }

    /// Returns whether any item or publication failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(ReconciliationOutcome::has_failure)
    }

    /// Returns the success signal for the caller's exit status.
    ///
    /// With `tolerate_failures` set, failed outcomes do not count.
    #[must_use]
    pub fn is_success(&self, tolerate_failures: bool) -> bool {
        tolerate_failures || !self.has_failures()
    }

    /// Returns the outcomes carrying the given tag.
    pub fn outcomes_of(&self, kind: OutcomeKind) -> impl Iterator<Item = &ReconciliationOutcome> {
        self.outcomes
            .iter()
            .filter(move |outcome| outcome.kind() == kind)
    }
}
