//! Remote tracker capability port.

use crate::sync::domain::{
    ArtifactPath, BranchName, CommitSha, DeclaredItem, ExportFilter, FailureReason, ItemChanges,
    PullRequestNumber, RemoteId, RemoteItem, StateFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

/// Result type for remote tracker operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Server-side narrowing of an item listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    /// State restriction.
    pub state: StateFilter,
    /// Labels every listed item must carry.
    pub labels: BTreeSet<String>,
    /// Only items updated at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl ItemQuery {
    /// Lists every item regardless of state.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }
}

impl From<&ExportFilter> for ItemQuery {
    fn from(filter: &ExportFilter) -> Self {
        Self {
            state: filter.state(),
            labels: filter.labels().clone(),
            since: filter.since(),
        }
    }
}

/// One page of an item listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPage {
    /// Items on this page.
    pub items: Vec<RemoteItem>,
    /// Number of the following page, if any.
    pub next_page: Option<u32>,
}

/// Fields of an item to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    /// Title (the matching key).
    pub title: String,
    /// Body text.
    pub body: String,
    /// Labels.
    pub labels: BTreeSet<String>,
    /// Assignees.
    pub assignees: BTreeSet<String>,
    /// Milestone title.
    pub milestone: Option<String>,
}

impl From<&DeclaredItem> for NewItem {
    fn from(item: &DeclaredItem) -> Self {
        Self {
            title: item.key().to_owned(),
            body: item.body().to_owned(),
            labels: item.labels().clone(),
            assignees: item.assignees().clone(),
            milestone: item.milestone().map(ToOwned::to_owned),
        }
    }
}

/// Name and tip of the repository's default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    /// Branch name.
    pub name: BranchName,
    /// Tip commit.
    pub sha: CommitSha,
}

/// Branch ref returned by [`RemoteTracker::create_ref`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefHandle {
    /// Branch name.
    pub name: BranchName,
    /// Current tip of the ref.
    pub sha: CommitSha,
    /// The ref already existed and was left untouched.
    pub existed: bool,
}

/// One file write on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommit {
    /// Target branch.
    pub branch: BranchName,
    /// Repository path.
    pub path: ArtifactPath,
    /// File content.
    pub content: Vec<u8>,
    /// Commit message.
    pub message: String,
}

/// Commit created by [`RemoteTracker::commit_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHandle {
    /// New branch tip.
    pub sha: CommitSha,
}

/// Fields of a pull request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    /// Title.
    pub title: String,
    /// Source branch.
    pub head: BranchName,
    /// Target branch.
    pub base: BranchName,
    /// Body text.
    pub body: String,
    /// Labels applied to the pull request.
    pub labels: BTreeSet<String>,
}

/// Pull request returned by [`RemoteTracker::create_pull_request`] and
/// [`RemoteTracker::update_pull_request`], with its current remote fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestHandle {
    /// Pull request number.
    pub number: PullRequestNumber,
    /// An open pull request for the head branch already existed.
    pub existed: bool,
    /// Current title.
    pub title: String,
    /// Current body.
    pub body: String,
    /// Current labels.
    pub labels: BTreeSet<String>,
}

/// Fields of an existing pull request to overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestChanges {
    /// New title.
    pub title: Option<String>,
    /// New body.
    pub body: Option<String>,
    /// Complete replacement label set.
    pub labels: Option<BTreeSet<String>>,
}

impl PullRequestChanges {
    /// Computes the fields of `current` that differ from `desired`.
    #[must_use]
    pub fn between(desired: &NewPullRequest, current: &PullRequestHandle) -> Self {
        Self {
            title: (desired.title != current.title).then(|| desired.title.clone()),
            body: (desired.body != current.body).then(|| desired.body.clone()),
            labels: (desired.labels != current.labels).then(|| desired.labels.clone()),
        }
    }

    /// Returns whether no field differs.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.labels.is_none()
    }

    /// Returns the names of the populated fields.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            (self.title.is_some(), "title"),
            (self.body.is_some(), "body"),
            (self.labels.is_some(), "labels"),
        ]
        .into_iter()
        .filter_map(|(changed, field)| changed.then_some(field))
        .collect()
    }
}

/// Typed capability set of the remote tracker.
///
/// Implementations classify every failure as a [`RemoteError`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteTracker: Send + Sync {
    /// Lists one page of items (1-based page numbers).
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the listing fails.
    async fn list_items(&self, query: &ItemQuery, page: u32) -> RemoteResult<ItemPage>;

    /// Creates an item. New items are always open.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Validation`] when the remote rejects a field.
    async fn create_item(&self, item: &NewItem) -> RemoteResult<RemoteItem>;

    /// Applies only the populated fields of `changes`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] when the item no longer exists.
    async fn update_item(&self, id: RemoteId, changes: &ItemChanges) -> RemoteResult<RemoteItem>;

    /// Returns the default branch and its tip.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the repository cannot be read.
    async fn default_branch(&self) -> RemoteResult<BranchHead>;

    /// Creates a branch at `from`; an existing ref is returned unchanged
    /// with [`RefHandle::existed`] set.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the ref cannot be created.
    async fn create_ref(&self, name: &BranchName, from: &CommitSha) -> RemoteResult<RefHandle>;

    /// Reads a file from a branch; `None` when the path does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] when the branch does not exist.
    async fn fetch_file(
        &self,
        branch: &BranchName,
        path: &ArtifactPath,
    ) -> RemoteResult<Option<Vec<u8>>>;

    /// Commits one file on a branch.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] when the branch does not exist.
    async fn commit_file(&self, commit: &FileCommit) -> RemoteResult<CommitHandle>;

    /// Opens a pull request; an open pull request for the same head branch
    /// is returned with [`PullRequestHandle::existed`] set.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the pull request cannot be opened.
    async fn create_pull_request(
        &self,
        pull_request: &NewPullRequest,
    ) -> RemoteResult<PullRequestHandle>;

    /// Overwrites the populated fields of an existing pull request.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] when the pull request does not
    /// exist.
    async fn update_pull_request(
        &self,
        number: PullRequestNumber,
        changes: &PullRequestChanges,
    ) -> RemoteResult<PullRequestHandle>;
}

/// Classified failure of a remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The addressed resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Missing resource.
        resource: String,
    },

    /// The remote rejected the submitted values.
    #[error("validation failed: {message}")]
    Validation {
        /// Remote message.
        message: String,
    },

    /// The call was rejected until the rate-limit window resets.
    #[error("rate limited until {reset_at}")]
    RateLimited {
        /// Instant at which calls may resume.
        reset_at: DateTime<Utc>,
    },

    /// Credentials were rejected.
    #[error("authentication failed: {message}")]
    Auth {
        /// Remote message.
        message: String,
    },

    /// Network failure or server error.
    #[error("transient failure: {message}")]
    Transient {
        /// Failure description.
        message: String,
    },
}

impl RemoteError {
    /// Builds a [`RemoteError::NotFound`].
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Builds a [`RemoteError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Builds a [`RemoteError::RateLimited`].
    #[must_use]
    pub const fn rate_limited(reset_at: DateTime<Utc>) -> Self {
        Self::RateLimited { reset_at }
    }

    /// Builds a [`RemoteError::Auth`].
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Builds a [`RemoteError::Transient`].
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Returns whether the failure must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<RemoteError> for FailureReason {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound { resource } => Self::StaleReference { resource },
            RemoteError::Validation { message } => Self::Rejected { message },
            RemoteError::RateLimited { reset_at } => Self::RateLimited { reset_at },
            RemoteError::Auth { message } => Self::Unauthorized { message },
            RemoteError::Transient { message } => Self::Unavailable { message },
        }
    }
}
