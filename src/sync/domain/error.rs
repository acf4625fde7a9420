//! Error types for synchronization domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing synchronization domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncDomainError {
    /// The item key is empty after trimming.
    #[error("item key must not be empty")]
    EmptyItemKey,

    /// The remote item identifier is invalid.
    #[error("invalid remote item identifier {0}, expected a positive integer")]
    InvalidRemoteId(u64),

    /// The pull request number is invalid.
    #[error("invalid pull request number {0}, expected a positive integer")]
    InvalidPullRequestNumber(u64),

    /// The commit SHA is not a hexadecimal object name.
    #[error("invalid commit sha '{0}'")]
    InvalidCommitSha(String),

    /// The branch name violates ref-name rules.
    #[error("invalid branch name '{name}': {reason}")]
    InvalidBranchName {
        /// Rejected branch name.
        name: String,
        /// Violated rule.
        reason: &'static str,
    },

    /// The artifact path cannot be committed to a repository.
    #[error("invalid artifact path '{path}': {reason}")]
    InvalidArtifactPath {
        /// Rejected artifact path.
        path: String,
        /// Violated rule.
        reason: &'static str,
    },
}

/// Error returned while parsing item states from external input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown item state: {0}")]
pub struct ParseItemStateError(pub String);
