//! Identifier and validated scalar types for the synchronization domain.

use super::SyncDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one reconciliation or export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authoritative numeric identity of an item on the remote tracker.
///
/// # Examples
///
///     use tracksync::sync::domain::RemoteId;
///
///     let id = RemoteId::new(42).expect("valid");
///     assert_eq!(id.to_string(), "42");
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(u64);

impl RemoteId {
    /// Creates a validated remote identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidRemoteId`] when the value is zero.
    pub const fn new(value: u64) -> Result<Self, SyncDomainError> {
        if value == 0 {
            return Err(SyncDomainError::InvalidRemoteId(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Positive pull request number on the remote tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestNumber(u64);

impl PullRequestNumber {
    /// Creates a validated pull request number.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidPullRequestNumber`] when the value
    /// is zero.
    pub const fn new(value: u64) -> Result<Self, SyncDomainError> {
        if value == 0 {
            return Err(SyncDomainError::InvalidPullRequestNumber(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PullRequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hexadecimal Git object name of a commit.
///
/// Abbreviated names (at least seven characters) are accepted so that
/// adapters may pass through whatever the remote reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitSha(String);

impl CommitSha {
    const MIN_LENGTH: usize = 7;
    const MAX_LENGTH: usize = 64;

    /// Creates a validated commit SHA, normalized to lower case.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidCommitSha`] when the value is not a
    /// 7 to 64 character hexadecimal string.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();
        let has_valid_length =
            (Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&normalized.len());
        if !has_valid_length || !normalized.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(SyncDomainError::InvalidCommitSha(raw));
        }
        Ok(Self(normalized))
    }

    /// Returns the SHA as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CommitSha {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
