//! Remote-item predicates used by export.

use super::{ItemState, RemoteItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// State filter for listing and export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFilter {
    /// Only open items.
    Open,
    /// Only closed items.
    Closed,
    /// Every item.
    #[default]
    All,
}

impl StateFilter {
    /// Returns whether `state` passes the filter.
    #[must_use]
    pub const fn admits(self, state: ItemState) -> bool {
        matches!(
            (self, state),
            (Self::All, _) | (Self::Open, ItemState::Open) | (Self::Closed, ItemState::Closed)
        )
    }
}

/// Predicate over remote items.
pub trait ItemPredicate: Send + Sync {
    /// Returns whether `item` is selected.
    fn matches(&self, item: &RemoteItem) -> bool;
}

impl<F> ItemPredicate for F
where
    F: Fn(&RemoteItem) -> bool + Send + Sync,
{
    fn matches(&self, item: &RemoteItem) -> bool {
        self(item)
    }
}

/// Selects every item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnyItem;

impl ItemPredicate for AnyItem {
    fn matches(&self, _item: &RemoteItem) -> bool {
        true
    }
}

/// State, label and recency criteria composed with logical AND.
///
/// # Examples
///
///     use tracksync::sync::domain::{ExportFilter, StateFilter};
///
///     let filter = ExportFilter::default()
///         .with_state(StateFilter::Open)
///         .with_labels(["bug".to_owned()]);
///     assert_eq!(filter.state(), StateFilter::Open);
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportFilter {
    state: StateFilter,
    labels: BTreeSet<String>,
    since: Option<DateTime<Utc>>,
}

impl ExportFilter {
    /// Restricts the state.
    #[must_use]
    pub const fn with_state(mut self, state: StateFilter) -> Self {
        self.state = state;
        self
    }

    /// Requires every listed label to be present.
    #[must_use]
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }

    /// Requires `updated_at` to be at or after `since`.
    #[must_use]
    pub const fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Returns the state criterion.
    #[must_use]
    pub const fn state(&self) -> StateFilter {
        self.state
    }

    /// Returns the required labels.
    #[must_use]
    pub const fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Returns the recency criterion.
    #[must_use]
    pub const fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }
}

impl ItemPredicate for ExportFilter {
    fn matches(&self, item: &RemoteItem) -> bool {
        self.state.admits(item.state)
            && self.labels.is_subset(&item.labels)
            && self.since.is_none_or(|since| item.updated_at >= since)
    }
}
