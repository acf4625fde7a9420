//! Per-item reconciliation and publication results.

use super::{
    ArtifactPath, BranchName, CommitSha, ItemChanges, PullRequestNumber, RemoteId, SyncDomainError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Terminal outcome tag of one declared item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A new remote item was created.
    Created,
    /// The matched remote item was updated.
    Updated,
    /// The matched remote item already matched the declaration.
    Unchanged,
    /// The item was deliberately not processed.
    Skipped,
    /// Processing the item failed.
    Failed,
}

impl OutcomeKind {
    /// Returns the tag name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a run stopped issuing remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// A fatal failure aborted the run.
    RunAborted,
    /// The caller cancelled the run.
    Cancelled,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunAborted => write!(f, "run aborted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Reason attached to a `skipped` outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The item differs remotely but updates are disabled.
    UpdatesDisabled {
        /// The diff that would have been applied.
        changes: ItemChanges,
    },
    /// More than one remote item matches the declared key.
    Ambiguous {
        /// Every matching remote item, in listing order.
        candidates: Vec<RemoteId>,
    },
    /// The run stopped before this item reached a terminal state.
    Halted(HaltReason),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdatesDisabled { changes } => {
                write!(f, "updates disabled (would change: {changes})")
            }
            Self::Ambiguous { candidates } => {
                let ids: Vec<String> = candidates.iter().map(ToString::to_string).collect();
                write!(f, "ambiguous match ({})", ids.join(", "))
            }
            Self::Halted(reason) => write!(f, "{reason}"),
        }
    }
}

/// Classified reason attached to a `failed` outcome or publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The remote resource vanished after the snapshot was taken.
    StaleReference {
        /// Description of the missing resource.
        resource: String,
    },
    /// The remote rejected the submitted field values.
    Rejected {
        /// Message reported by the remote.
        message: String,
    },
    /// The remote refused the credentials.
    Unauthorized {
        /// Message reported by the remote.
        message: String,
    },
    /// Transient failures persisted after retries.
    Unavailable {
        /// Last failure message.
        message: String,
    },
    /// The call stayed rate-limited beyond the suspension budget.
    RateLimited {
        /// Last reported reset time.
        reset_at: DateTime<Utc>,
    },
    /// An artifact path cannot be committed.
    InvalidArtifact {
        /// Offending path.
        path: String,
        /// Violated rule.
        reason: String,
    },
    /// The publication branch name is invalid.
    InvalidBranch {
        /// Offending branch name.
        name: String,
        /// Violated rule.
        reason: String,
    },
    /// A configured template could not be rendered.
    Template {
        /// Renderer message.
        message: String,
    },
    /// The run halted while this item was in progress.
    Interrupted(HaltReason),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleReference { resource } => write!(f, "stale reference: {resource}"),
            Self::Rejected { message } => write!(f, "rejected by remote: {message}"),
            Self::Unauthorized { message } => write!(f, "unauthorized: {message}"),
            Self::Unavailable { message } => write!(f, "remote unavailable: {message}"),
            Self::RateLimited { reset_at } => write!(f, "rate limited until {reset_at}"),
            Self::InvalidArtifact { path, reason } => {
                write!(f, "invalid artifact path '{path}': {reason}")
            }
            Self::InvalidBranch { name, reason } => {
                write!(f, "invalid branch name '{name}': {reason}")
            }
            Self::Template { message } => write!(f, "template error: {message}"),
            Self::Interrupted(reason) => write!(f, "interrupted: {reason}"),
        }
    }
}

impl From<SyncDomainError> for FailureReason {
    fn from(err: SyncDomainError) -> Self {
        match err {
            SyncDomainError::InvalidBranchName { name, reason } => Self::InvalidBranch {
                name,
                reason: reason.to_owned(),
            },
            SyncDomainError::InvalidArtifactPath { path, reason } => Self::InvalidArtifact {
                path,
                reason: reason.to_owned(),
            },
            other => Self::Rejected {
                message: other.to_string(),
            },
        }
    }
}

/// Reconciliation status of one declared item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A new remote item was created.
    Created,
    /// The listed fields were updated.
    Updated {
        /// Applied changes.
        changes: ItemChanges,
    },
    /// No remote call was needed.
    Unchanged,
    /// The item was not processed.
    Skipped {
        /// Why the item was skipped.
        reason: SkipReason,
    },
    /// Processing failed.
    Failed {
        /// Classified failure.
        reason: FailureReason,
    },
}

impl OutcomeStatus {
    /// Returns the outcome tag.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Created => OutcomeKind::Created,
            Self::Updated { .. } => OutcomeKind::Updated,
            Self::Unchanged => OutcomeKind::Unchanged,
            Self::Skipped { .. } => OutcomeKind::Skipped,
            Self::Failed { .. } => OutcomeKind::Failed,
        }
    }
}

/// Named step of the artifact publication state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublicationStep {
    /// Creating (or reusing) the publication branch.
    BranchCreate,
    /// Committing artifacts to the branch.
    CommitArtifacts,
    /// Opening (or reusing) the pull request.
    PullRequestCreate,
}

impl PublicationStep {
    /// Returns the step name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BranchCreate => "branch-create",
            Self::CommitArtifacts => "commit-artifacts",
            Self::PullRequestCreate => "pull-request-create",
        }
    }
}

impl fmt::Display for PublicationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// References produced by a completed publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifacts {
    /// Publication branch.
    pub branch: BranchName,
    /// Branch tip after the artifacts were committed.
    pub commit_sha: CommitSha,
    /// Pull request number.
    pub pull_request: PullRequestNumber,
    /// The branch already existed and was reused.
    pub reused_branch: bool,
    /// An open pull request for the branch already existed and was reused.
    pub reused_pull_request: bool,
    /// Fields of the reused pull request that were refreshed.
    pub refreshed_fields: Vec<&'static str>,
    /// Paths that received a new commit; unchanged files are omitted.
    pub committed_paths: Vec<ArtifactPath>,
}

/// Failure of one publication step.
///
/// Steps completed before the failure are left in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationFailure {
    /// Step that failed.
    pub step: PublicationStep,
    /// Classified failure.
    pub reason: FailureReason,
    /// Branch in use when the failure happened, if one was resolved.
    pub branch: Option<BranchName>,
}

impl fmt::Display for PublicationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed at {}: {}", self.step, self.reason)
    }
}

/// Terminal state of the publication state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PublicationResult {
    /// All three steps succeeded.
    Published(PublishedArtifacts),
    /// A step failed and the remaining steps were not attempted.
    Failed(PublicationFailure),
}

impl PublicationResult {
    /// Returns whether publication completed.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&PublicationFailure> {
        match self {
            Self::Published(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// Result of reconciling one declared item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationOutcome {
    /// Input position of the declared item.
    pub position: usize,
    /// Declared key.
    pub key: String,
    /// Remote identity, when one is known.
    pub remote_id: Option<RemoteId>,
    /// Reconciliation status.
    #[serde(flatten)]
    pub status: OutcomeStatus,
    /// Publication result, when publication ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<PublicationResult>,
}

impl ReconciliationOutcome {
    /// Creates an outcome without a publication result.
    #[must_use]
    pub fn new(
        position: usize,
        key: impl Into<String>,
        remote_id: Option<RemoteId>,
        status: OutcomeStatus,
    ) -> Self {
        Self {
            position,
            key: key.into(),
            remote_id,
            status,
            publication: None,
        }
    }

    /// Returns the outcome tag.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        self.status.kind()
    }

    /// Returns whether the item or its publication failed.
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.kind() == OutcomeKind::Failed
            || self
                .publication
                .as_ref()
                .is_some_and(|publication| !publication.is_published())
    }
}

/// Run-level data-quality finding reported alongside outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Several remote items share one key.
    DuplicateRemoteKey {
        /// Shared key (as first listed).
        key: String,
        /// Remote items sharing the key, in listing order.
        remote_ids: Vec<RemoteId>,
    },
    /// A declared item matched more than one remote item.
    AmbiguousMatch {
        /// Declared key.
        key: String,
        /// Matching remote items.
        candidates: Vec<RemoteId>,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, key, ids) = match self {
            Self::DuplicateRemoteKey { key, remote_ids } => {
                ("duplicate remote key", key, remote_ids)
            }
            Self::AmbiguousMatch { key, candidates } => ("ambiguous match", key, candidates),
        };
        let joined: Vec<String> = ids.iter().map(|id| format!("#{id}")).collect();
        write!(f, "{label} '{key}': {}", joined.join(", "))
    }
}
