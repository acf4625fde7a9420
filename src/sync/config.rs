//! Typed configuration for synchronization runs.
//!
//! Every section implements [`Default`] and deserializes with missing fields
//! falling back to those defaults, so callers can load partial documents
//! from any serde format.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default pull request body; the closing keyword links the item.
pub const DEFAULT_PULL_REQUEST_BODY_TEMPLATE: &str = "Closes #{{ remote_id }}";

/// Default commit message for artifact commits.
pub const DEFAULT_COMMIT_MESSAGE_TEMPLATE: &str =
    "chore: attach files for '{{ key }}' (#{{ remote_id }})";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum SyncConfigError {
    /// The document is not valid for the configuration schema.
    #[error("invalid sync configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Complete configuration of a synchronization run.
///
/// # Examples
///
/// ```
/// use tracksync::sync::config::SyncConfig;
///
/// let config = SyncConfig::from_json_str(r#"{"reconcile": {"allow_update": false}}"#)
///     .expect("valid config");
/// assert!(!config.reconcile.allow_update);
/// assert_eq!(config.publication.branch_prefix, "feature");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Reconciliation behaviour.
    pub reconcile: ReconcileOptions,
    /// Artifact publication settings.
    pub publication: PublicationConfig,
    /// Retry policy for transient remote failures.
    pub retry: RetryPolicy,
    /// Rate-limit suspension policy.
    pub rate_limit: RateLimitPolicy,
}

impl SyncConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncConfigError::Parse`] when the document is malformed or
    /// a field has the wrong type.
    pub fn from_json_str(document: &str) -> Result<Self, SyncConfigError> {
        Ok(serde_json::from_str(document)?)
    }
}

/// Options controlling how declared items are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Update matched items that differ; otherwise they are skipped.
    pub allow_update: bool,
    /// Run artifact publication for items that declare artifacts.
    pub publish_artifacts: bool,
    /// Clear remote milestones the declaration leaves absent.
    pub manage_milestone: bool,
    /// Upper bound on items processed concurrently (zero acts as one).
    pub max_concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            allow_update: true,
            publish_artifacts: false,
            manage_milestone: false,
            max_concurrency: 1,
        }
    }
}

impl ReconcileOptions {
    /// Creates only missing items and reports differences without
    /// mutating matched ones.
    #[must_use]
    pub fn create_only() -> Self {
        Self {
            allow_update: false,
            ..Self::default()
        }
    }

    /// Full convergence including artifact publication and milestone
    /// management.
    #[must_use]
    pub fn full() -> Self {
        Self {
            publish_artifacts: true,
            manage_milestone: true,
            ..Self::default()
        }
    }

    /// Returns the effective worker count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

/// Artifact publication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicationConfig {
    /// Leading path component of derived branch names.
    pub branch_prefix: String,
    /// Maximum slug length in derived branch names.
    pub max_slug_length: usize,
    /// `minijinja` template for pull request bodies.
    pub pull_request_body_template: String,
    /// `minijinja` template for artifact commit messages.
    pub commit_message_template: String,
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "feature".to_owned(),
            max_slug_length: 48,
            pull_request_body_template: DEFAULT_PULL_REQUEST_BODY_TEMPLATE.to_owned(),
            commit_message_template: DEFAULT_COMMIT_MESSAGE_TEMPLATE.to_owned(),
        }
    }
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Disables retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1,
        }
    }

    /// Returns the delay before retry number `retry` (zero-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use tracksync::sync::config::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_for(0), Duration::from_millis(500));
    /// assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
    /// assert_eq!(policy.delay_for(20), Duration::from_millis(30_000));
    /// ```
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        let millis = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Suspension policy for rate-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Longest single suspension, in seconds.
    pub max_wait_secs: u64,
    /// Rate-limit responses tolerated for one call before it fails.
    pub max_suspensions: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_wait_secs: 300,
            max_suspensions: 5,
        }
    }
}

impl RateLimitPolicy {
    /// Returns the longest single suspension.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}
