//! Ordered, validated collection of declared items for one run.

use super::{DeclaredItem, KeyEquivalence};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A declared key that occurs more than once in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    /// Key of the repeated item (as written at `duplicate_position`).
    pub key: String,
    /// Input position of the first occurrence.
    pub first_position: usize,
    /// Input position of the repeated occurrence.
    pub duplicate_position: usize,
}

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' at positions {} and {}",
            self.key, self.first_position, self.duplicate_position
        )
    }
}

/// Structural invariant violations in the declared input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeclaredItemStoreError {
    /// Two or more declared items share an equivalent key.
    #[error("duplicate declared keys: {}", format_duplicates(.0))]
    DuplicateKeys(Vec<DuplicateKey>),
}

fn format_duplicates(duplicates: &[DuplicateKey]) -> String {
    duplicates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Declared items in input order, with keys unique under the run's
/// equivalence policy.
///
/// # Examples
///
///     use tracksync::sync::domain::{DeclaredItem, DeclaredItemStore, ExactMatch};
///
///     let items = vec![
///         DeclaredItem::new("first").expect("valid"),
///         DeclaredItem::new("second").expect("valid"),
///     ];
///     let store = DeclaredItemStore::new(items, &ExactMatch).expect("unique keys");
///     assert_eq!(store.len(), 2);
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredItemStore {
    items: Vec<DeclaredItem>,
}

impl DeclaredItemStore {
    /// Validates and wraps the declared input.
    ///
    /// # Errors
    ///
    /// Returns [`DeclaredItemStoreError::DuplicateKeys`] listing every
    /// repeated key when two items are equivalent under `equivalence`.
    pub fn new(
        items: Vec<DeclaredItem>,
        equivalence: &dyn KeyEquivalence,
    ) -> Result<Self, DeclaredItemStoreError> {
        let mut first_seen: HashMap<String, usize> = HashMap::with_capacity(items.len());
        let mut duplicates = Vec::new();
        for (position, item) in items.iter().enumerate() {
            let canonical = equivalence.canonical(item.key());
            match first_seen.get(&canonical) {
                Some(&first_position) => duplicates.push(DuplicateKey {
                    key: item.key().to_owned(),
                    first_position,
                    duplicate_position: position,
                }),
                None => {
                    first_seen.insert(canonical, position);
                }
            }
        }

        if duplicates.is_empty() {
            Ok(Self { items })
        } else {
            Err(DeclaredItemStoreError::DuplicateKeys(duplicates))
        }
    }

    /// Returns the items in input order.
    #[must_use]
    pub fn items(&self) -> &[DeclaredItem] {
        &self.items
    }

    /// Iterates over the items in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, DeclaredItem> {
        self.items.iter()
    }

    /// Returns the item at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&DeclaredItem> {
        self.items.get(position)
    }

    /// Returns the number of declared items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a DeclaredItemStore {
    type Item = &'a DeclaredItem;
    type IntoIter = std::slice::Iter<'a, DeclaredItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
