//! Key equivalence policies shared by matching and set comparison.
//!
//! An equivalence is expressed as a canonicalization: two strings are
//! equivalent exactly when their canonical forms are equal. This keeps
//! matching a hash lookup no matter which policy is plugged in.

use super::slugify;
use std::collections::BTreeSet;

/// Equivalence relation over item keys, labels and assignee names.
pub trait KeyEquivalence: Send + Sync {
    /// Returns the canonical representative of `value`.
    fn canonical(&self, value: &str) -> String;

    /// Returns whether two values are equivalent.
    fn equivalent(&self, left: &str, right: &str) -> bool {
        self.canonical(left) == self.canonical(right)
    }
}

impl<F> KeyEquivalence for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn canonical(&self, value: &str) -> String {
        self(value)
    }
}

/// Exact string equality (the default policy).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExactMatch;

impl KeyEquivalence for ExactMatch {
    fn canonical(&self, value: &str) -> String {
        value.to_owned()
    }
}

/// Case-insensitive equality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaseInsensitive;

impl KeyEquivalence for CaseInsensitive {
    fn canonical(&self, value: &str) -> String {
        value.to_lowercase()
    }
}

/// Equality after slug normalization, so `"Fix: crash"` matches
/// `"fix crash"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlugMatch;

impl KeyEquivalence for SlugMatch {
    fn canonical(&self, value: &str) -> String {
        slugify(value)
    }
}

/// Canonicalizes every member of a name set.
#[must_use]
pub fn canonical_set<'a>(
    equivalence: &dyn KeyEquivalence,
    values: impl IntoIterator<Item = &'a String>,
) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|value| equivalence.canonical(value))
        .collect()
}
