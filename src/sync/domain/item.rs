//! Declared and remote item value objects.

use super::{ParseItemStateError, RemoteId, SyncDomainError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Open/closed state shared by declared and remote items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// The item is open.
    #[default]
    Open,
    /// The item is closed.
    Closed,
}

impl ItemState {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl TryFrom<&str> for ItemState {
    type Error = ParseItemStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(ParseItemStateError(value.to_owned())),
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// File artifact attached to a declared item.
///
/// The path is kept verbatim; it is validated when the artifact is
/// committed so that a malformed path fails only its owning item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    path: String,
    content: Vec<u8>,
}

impl Artifact {
    /// Creates an artifact from a repository-relative path and raw content.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Returns the declared repository path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the artifact content.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// Validated repository-relative path for a committed artifact.
///
/// # Examples
///
///     use tracksync::sync::domain::ArtifactPath;
///
///     assert!(ArtifactPath::new("docs/plan.md").is_ok());
///     assert!(ArtifactPath::new("../outside.md").is_err());
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactPath(String);

impl ArtifactPath {
    /// Creates a validated artifact path.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidArtifactPath`] when the path is
    /// empty, absolute, uses backslashes, or contains empty, `.` or `..`
    /// segments.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        if let Some(reason) = artifact_path_violation(&raw) {
            return Err(SyncDomainError::InvalidArtifactPath { path: raw, reason });
        }
        Ok(Self(raw))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn artifact_path_violation(path: &str) -> Option<&'static str> {
    if path.trim().is_empty() {
        return Some("path is empty");
    }
    if path.starts_with('/') {
        return Some("path must be relative to the repository root");
    }
    if path.contains('\\') {
        return Some("path must use forward slashes");
    }
    if path.chars().any(char::is_control) {
        return Some("path contains control characters");
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Some("path contains an empty, '.' or '..' segment");
    }
    None
}

impl AsRef<str> for ArtifactPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Desired state of one tracker item, as loaded from the declarative source.
///
/// Built once through the `with_*` methods and treated as immutable for
/// the rest of a run. Compared fields are stored exactly as given; cleaning
/// up the declarative source is the loader's job.
///
/// # Examples
///
///     use tracksync::sync::domain::{DeclaredItem, ItemState};
///
///     let item = DeclaredItem::new("Add retry budget")
///         .expect("valid key")
///         .with_body("Bound retries per call.")
///         .with_labels(["enhancement".to_owned()]);
///     assert_eq!(item.key(), "Add retry budget");
///     assert_eq!(item.state(), ItemState::Open);
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredItem {
    key: String,
    body: String,
    labels: BTreeSet<String>,
    assignees: BTreeSet<String>,
    milestone: Option<String>,
    state: ItemState,
    artifacts: Vec<Artifact>,
    branch: Option<String>,
    pull_request_title: Option<String>,
}

impl DeclaredItem {
    /// Creates a declared item with its matching key.
    ///
    /// The key is kept verbatim so that it compares equal to the remote
    /// title it was read from.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::EmptyItemKey`] if the key is blank.
    pub fn new(key: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw_key = key.into();
        if raw_key.trim().is_empty() {
            return Err(SyncDomainError::EmptyItemKey);
        }

        Ok(Self {
            key: raw_key,
            body: String::new(),
            labels: BTreeSet::new(),
            assignees: BTreeSet::new(),
            milestone: None,
            state: ItemState::Open,
            artifacts: Vec::new(),
            branch: None,
            pull_request_title: None,
        })
    }

    /// Sets the item body. The text is kept verbatim.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets item labels. Names are kept verbatim; duplicates collapse.
    #[must_use]
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }

    /// Sets item assignees. Logins are kept verbatim.
    #[must_use]
    pub fn with_assignees(mut self, assignees: impl IntoIterator<Item = String>) -> Self {
        self.assignees = assignees.into_iter().collect();
        self
    }

    /// Sets the item milestone title verbatim.
    #[must_use]
    pub fn with_milestone(mut self, milestone: impl Into<String>) -> Self {
        self.milestone = Some(milestone.into());
        self
    }

    /// Sets the desired item state.
    #[must_use]
    pub const fn with_state(mut self, state: ItemState) -> Self {
        self.state = state;
        self
    }

    /// Appends an artifact; declaration order is the commit order.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Overrides the derived publication branch name.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        let value = branch.into();
        let normalized = value.trim();
        self.branch = (!normalized.is_empty()).then(|| normalized.to_owned());
        self
    }

    /// Overrides the pull request title, which otherwise equals the key.
    #[must_use]
    pub fn with_pull_request_title(mut self, title: impl Into<String>) -> Self {
        let value = title.into();
        let normalized = value.trim();
        self.pull_request_title = (!normalized.is_empty()).then(|| normalized.to_owned());
        self
    }

    /// Returns the matching key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the item body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns item labels.
    #[must_use]
    pub const fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Returns item assignees.
    #[must_use]
    pub const fn assignees(&self) -> &BTreeSet<String> {
        &self.assignees
    }

    /// Returns the item milestone.
    #[must_use]
    pub fn milestone(&self) -> Option<&str> {
        self.milestone.as_deref()
    }

    /// Returns the desired state.
    #[must_use]
    pub const fn state(&self) -> ItemState {
        self.state
    }

    /// Returns artifacts in declaration order.
    #[must_use]
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Returns the explicit branch override.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Returns the pull request title.
    #[must_use]
    pub fn pull_request_title(&self) -> &str {
        self.pull_request_title.as_deref().unwrap_or(&self.key)
    }
}

/// Snapshot of one item as reported by the remote tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Authoritative remote identity.
    pub remote_id: RemoteId,
    /// Matching key (the item title).
    pub key: String,
    /// Item body; an absent remote body is the empty string.
    pub body: String,
    /// Label names.
    pub labels: BTreeSet<String>,
    /// Assignee logins.
    pub assignees: BTreeSet<String>,
    /// Milestone title.
    pub milestone: Option<String>,
    /// Open/closed state.
    pub state: ItemState,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RemoteItem {
    /// Creates an open remote item with empty fields.
    #[must_use]
    pub fn new(remote_id: RemoteId, key: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            remote_id,
            key: key.into(),
            body: String::new(),
            labels: BTreeSet::new(),
            assignees: BTreeSet::new(),
            milestone: None,
            state: ItemState::Open,
            updated_at,
        }
    }
}
