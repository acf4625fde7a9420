//! Field-level differences between a declared item and its remote match.

use super::{DeclaredItem, ItemState, KeyEquivalence, RemoteItem, canonical_set};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Item fields that can take part in an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemField {
    /// Title (the matching key).
    Title,
    /// Body text.
    Body,
    /// Label set.
    Labels,
    /// Assignee set.
    Assignees,
    /// Milestone.
    Milestone,
    /// Open/closed state.
    State,
}

impl ItemField {
    /// Returns the field name used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Body => "body",
            Self::Labels => "labels",
            Self::Assignees => "assignees",
            Self::Milestone => "milestone",
            Self::State => "state",
        }
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Change to an unordered name set.
///
/// `desired` is the complete target set sent to the remote; `added` and
/// `removed` exist for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetChange {
    /// Complete target set.
    pub desired: BTreeSet<String>,
    /// Names present in the target but missing remotely.
    pub added: BTreeSet<String>,
    /// Names present remotely but missing from the target.
    pub removed: BTreeSet<String>,
}

impl SetChange {
    /// Compares two name sets under `equivalence`; `None` means equal.
    #[must_use]
    pub fn between(
        desired: &BTreeSet<String>,
        current: &BTreeSet<String>,
        equivalence: &dyn KeyEquivalence,
    ) -> Option<Self> {
        let desired_canonical = canonical_set(equivalence, desired);
        let current_canonical = canonical_set(equivalence, current);
        if desired_canonical == current_canonical {
            return None;
        }

        let added = desired
            .iter()
            .filter(|name| !current_canonical.contains(&equivalence.canonical(name)))
            .cloned()
            .collect();
        let removed = current
            .iter()
            .filter(|name| !desired_canonical.contains(&equivalence.canonical(name)))
            .cloned()
            .collect();
        Some(Self {
            desired: desired.clone(),
            added,
            removed,
        })
    }
}

/// Change to the milestone field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "title", rename_all = "snake_case")]
pub enum MilestoneChange {
    /// Assign the named milestone.
    Set(String),
    /// Remove the current milestone.
    Clear,
}

/// Minimal set of field changes required to converge a remote item.
///
/// Only fields that differ are populated, so an update issued from this
/// value touches nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Label set change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<SetChange>,
    /// Assignee set change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignees: Option<SetChange>,
    /// Milestone change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<MilestoneChange>,
    /// New state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ItemState>,
}

/// Policy knobs that influence how a diff is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffPolicy {
    /// Treat a declared-absent milestone as a request to clear it.
    pub manage_milestone: bool,
}

impl ItemChanges {
    /// Computes the field-level diff from `remote` to `declared`.
    ///
    /// Labels and assignees are compared as unordered sets under
    /// `equivalence`; body, milestone and state by value. The title only
    /// changes when the keys are not equivalent, which happens for matches
    /// made through a rename mapping. A declared-absent milestone clears a
    /// remote one only when [`DiffPolicy::manage_milestone`] is set.
    #[must_use]
    pub fn between(
        declared: &DeclaredItem,
        remote: &RemoteItem,
        equivalence: &dyn KeyEquivalence,
        policy: DiffPolicy,
    ) -> Self {
        let title = (!equivalence.equivalent(declared.key(), &remote.key))
            .then(|| declared.key().to_owned());
        let body = (declared.body() != remote.body).then(|| declared.body().to_owned());
        let labels = SetChange::between(declared.labels(), &remote.labels, equivalence);
        let assignees = SetChange::between(declared.assignees(), &remote.assignees, equivalence);
        let milestone = match (declared.milestone(), remote.milestone.as_deref()) {
            (Some(wanted), Some(current)) if wanted == current => None,
            (Some(wanted), _) => Some(MilestoneChange::Set(wanted.to_owned())),
            (None, Some(_)) if policy.manage_milestone => Some(MilestoneChange::Clear),
            (None, _) => None,
        };
        let state = (declared.state() != remote.state).then_some(declared.state());

        Self {
            title,
            body,
            labels,
            assignees,
            milestone,
            state,
        }
    }

    /// Creates a change that only sets the item state.
    #[must_use]
    pub fn state_only(state: ItemState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Returns whether no field differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Returns the populated fields in a stable order.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<ItemField> {
        [
            (self.title.is_some(), ItemField::Title),
            (self.body.is_some(), ItemField::Body),
            (self.labels.is_some(), ItemField::Labels),
            (self.assignees.is_some(), ItemField::Assignees),
            (self.milestone.is_some(), ItemField::Milestone),
            (self.state.is_some(), ItemField::State),
        ]
        .into_iter()
        .filter_map(|(changed, field)| changed.then_some(field))
        .collect()
    }

    /// Applies the changes to a remote item in place.
    pub fn apply_to(&self, item: &mut RemoteItem) {
        if let Some(title) = &self.title {
            item.key.clone_from(title);
        }
        if let Some(body) = &self.body {
            item.body.clone_from(body);
        }
        if let Some(labels) = &self.labels {
            item.labels.clone_from(&labels.desired);
        }
        if let Some(assignees) = &self.assignees {
            item.assignees.clone_from(&assignees.desired);
        }
        match &self.milestone {
            Some(MilestoneChange::Set(title)) => item.milestone = Some(title.clone()),
            Some(MilestoneChange::Clear) => item.milestone = None,
            None => {}
        }
        if let Some(state) = self.state {
            item.state = state;
        }
    }
}

impl fmt::Display for ItemChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .changed_fields()
            .into_iter()
            .map(ItemField::as_str)
            .collect();
        write!(f, "{}", names.join(", "))
    }
}
