//! Branch-name value objects for artifact publication.

use super::{RemoteId, SyncDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a validated branch name.
///
/// `refs/heads/` plus the name must fit in the 255-byte ref-name limit
/// enforced by common filesystems.
const MAX_BRANCH_NAME_LENGTH: usize = 244;

/// Characters that `git check-ref-format` rejects anywhere in a ref name.
const FORBIDDEN_CHARACTERS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

/// Validated Git branch name.
///
/// # Examples
///
///     use tracksync::sync::domain::BranchName;
///
///     let name = BranchName::new("feature/12-add-retry").expect("valid");
///     assert_eq!(name.as_str(), "feature/12-add-retry");
///     assert!(BranchName::new("feature/..").is_err());
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Creates a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidBranchName`] when the value breaks
    /// Git ref-name rules or exceeds the length limit.
    pub fn new(value: impl Into<String>) -> Result<Self, SyncDomainError> {
        let raw = value.into();
        if let Some(reason) = ref_name_violation(&raw) {
            return Err(SyncDomainError::InvalidBranchName { name: raw, reason });
        }
        Ok(Self(raw))
    }

    /// Derives the deterministic publication branch for a remote item.
    ///
    /// The result has the form `<prefix>/<remote_id>-<slug>`, where the
    /// slug comes from [`slugify`] and is cut to `max_slug_length`
    /// characters.
    ///
    /// # Errors
    ///
    /// Returns [`SyncDomainError::InvalidBranchName`] when the prefix makes
    /// the derived name invalid.
    pub fn derive(
        prefix: &str,
        remote_id: RemoteId,
        key: &str,
        max_slug_length: usize,
    ) -> Result<Self, SyncDomainError> {
        let truncated: String = slugify(key).chars().take(max_slug_length).collect();
        let slug = truncated.trim_end_matches('-');
        let leaf = if slug.is_empty() {
            remote_id.to_string()
        } else {
            format!("{remote_id}-{slug}")
        };
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            Self::new(leaf)
        } else {
            Self::new(format!("{prefix}/{leaf}"))
        }
    }

    /// Returns the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lower-cases `key` and collapses every run of characters outside
/// `[a-z0-9]` into one hyphen, trimming hyphens at both ends.
///
/// # Examples
///
///     use tracksync::sync::domain::slugify;
///
///     assert_eq!(slugify("Fix: Crash on  Start!"), "fix-crash-on-start");
#[must_use]
pub fn slugify(key: &str) -> String {
    let mut slug = String::with_capacity(key.len());
    let mut pending_separator = false;
    for ch in key.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }
    slug
}

fn ref_name_violation(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("name is empty");
    }
    if name.len() > MAX_BRANCH_NAME_LENGTH {
        return Some("name exceeds the ref-name length limit");
    }
    if name.chars().any(|ch| ch.is_ascii_control() || FORBIDDEN_CHARACTERS.contains(&ch)) {
        return Some("name contains a forbidden character");
    }
    if name.contains("..") || name.contains("@{") || name == "@" {
        return Some("name contains a forbidden sequence");
    }
    if name.starts_with('/') || name.ends_with('/') || name.ends_with('.') {
        return Some("name has a forbidden leading or trailing character");
    }
    if name
        .split('/')
        .any(|component| {
            component.is_empty() || component.starts_with('.') || component.ends_with(".lock")
        })
    {
        return Some("name has an empty, hidden or '.lock' component");
    }
    None
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
