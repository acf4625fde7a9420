//! Domain model for declarative tracker synchronization.
//!
//! Declared and remote items, the diff between them, per-item outcomes and
//! the run report. Nothing in this module performs I/O.

mod branch;
mod changes;
mod equivalence;
mod error;
mod filter;
mod ids;
mod item;
mod outcome;
mod report;
mod store;

pub use branch::{BranchName, slugify};
pub use changes::{DiffPolicy, ItemChanges, ItemField, MilestoneChange, SetChange};
pub use equivalence::{CaseInsensitive, ExactMatch, KeyEquivalence, SlugMatch, canonical_set};
pub use error::{ParseItemStateError, SyncDomainError};
pub use filter::{AnyItem, ExportFilter, ItemPredicate, StateFilter};
pub use ids::{CommitSha, PullRequestNumber, RemoteId, RunId};
pub use item::{Artifact, ArtifactPath, DeclaredItem, ItemState, RemoteItem};
pub use outcome::{
    Diagnostic, FailureReason, HaltReason, OutcomeKind, OutcomeStatus, PublicationFailure,
    PublicationResult, PublicationStep, PublishedArtifacts, ReconciliationOutcome, SkipReason,
};
pub use report::{OutcomeSummary, ReconciliationReport};
pub use store::{DeclaredItemStore, DeclaredItemStoreError, DuplicateKey};
