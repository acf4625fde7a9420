//! Identity resolution between declared items and a remote snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::sync::domain::{
    DeclaredItem, DeclaredItemStore, Diagnostic, ExactMatch, KeyEquivalence, RemoteId, RemoteItem,
};

/// User-confirmed key renames, from a previous key to the current one.
///
/// Matching stays stateless: a rename only widens the set of keys looked up
/// for one declared item.
///
/// # Examples
///
///     use tracksync::sync::services::RenameTable;
///
///     let renames = RenameTable::new().with_rename("Old title", "New title");
///     assert_eq!(renames.len(), 1);
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameTable {
    entries: Vec<(String, String)>,
}

impl RenameTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `previous` is now called `current`.
    #[must_use]
    pub fn with_rename(mut self, previous: impl Into<String>, current: impl Into<String>) -> Self {
        self.entries.push((previous.into(), current.into()));
        self
    }

    /// Returns previous keys recorded for `current`.
    pub fn previous_keys<'a>(
        &'a self,
        current: &'a str,
        equivalence: &'a dyn KeyEquivalence,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(_, renamed)| equivalence.equivalent(renamed, current))
            .map(|(previous, _)| previous.as_str())
    }

    /// Returns the number of recorded renames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no rename is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How one declared item relates to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one remote item matches; the value indexes the snapshot.
    Matched(usize),
    /// No remote item matches; the item takes the create path.
    Unmatched,
    /// Several remote items match; the item must not be processed.
    Ambiguous(Vec<RemoteId>),
}

/// Resolution of the declared item at `position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEntry {
    /// Declared input position.
    pub position: usize,
    /// Resolution against the snapshot.
    pub resolution: Resolution,
}

/// Read-only match table shared by reconciliation workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTable {
    entries: Vec<MatchEntry>,
    diagnostics: Vec<Diagnostic>,
}

impl MatchTable {
    /// Returns one entry per declared item, in declared order.
    #[must_use]
    pub fn entries(&self) -> &[MatchEntry] {
        &self.entries
    }

    /// Returns the resolution of the declared item at `position`.
    #[must_use]
    pub fn resolution(&self, position: usize) -> Option<&Resolution> {
        self.entries.get(position).map(|entry| &entry.resolution)
    }

    /// Returns the diagnostics found while resolving.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Canonical key to snapshot indices, in listing order.
struct KeyIndex {
    order: Vec<String>,
    positions: HashMap<String, Vec<usize>>,
}

impl KeyIndex {
    fn build(remote: &[RemoteItem], equivalence: &dyn KeyEquivalence) -> Self {
        let mut order = Vec::new();
        let mut positions: HashMap<String, Vec<usize>> = HashMap::with_capacity(remote.len());
        for (index, item) in remote.iter().enumerate() {
            let canonical = equivalence.canonical(&item.key);
            let slot = positions.entry(canonical.clone()).or_default();
            if slot.is_empty() {
                order.push(canonical);
            }
            slot.push(index);
        }
        Self { order, positions }
    }

    fn lookup(&self, canonical: &str) -> &[usize] {
        self.positions
            .get(canonical)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn duplicates<'a>(&'a self, remote: &'a [RemoteItem]) -> impl Iterator<Item = Diagnostic> + 'a {
        self.order.iter().filter_map(move |canonical| {
            let indices = self.lookup(canonical);
            if indices.len() < 2 {
                return None;
            }
            let items: Vec<&RemoteItem> = indices.iter().filter_map(|&i| remote.get(i)).collect();
            let key = items.first().map(|item| item.key.clone())?;
            Some(Diagnostic::DuplicateRemoteKey {
                key,
                remote_ids: items.iter().map(|item| item.remote_id).collect(),
            })
        })
    }
}

/// Maps declared items to at most one remote item each.
///
/// Keys are compared through a pluggable [`KeyEquivalence`]; exact string
/// equality is the default. Multiple candidates are never guessed between:
/// the item resolves as [`Resolution::Ambiguous`] and a diagnostic is
/// recorded.
#[derive(Clone)]
pub struct IdentityResolver {
    equivalence: Arc<dyn KeyEquivalence>,
    renames: RenameTable,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(Arc::new(ExactMatch))
    }
}

impl IdentityResolver {
    /// Creates a resolver using `equivalence`.
    #[must_use]
    pub fn new(equivalence: Arc<dyn KeyEquivalence>) -> Self {
        Self {
            equivalence,
            renames: RenameTable::default(),
        }
    }

    /// Adds user-confirmed renames.
    #[must_use]
    pub fn with_renames(mut self, renames: RenameTable) -> Self {
        self.renames = renames;
        self
    }

    /// Returns the equivalence policy.
    #[must_use]
    pub fn equivalence(&self) -> Arc<dyn KeyEquivalence> {
        Arc::clone(&self.equivalence)
    }

    /// Resolves every declared item against `remote`.
    ///
    /// The remote listing is indexed in one pass. A declared item looks up
    /// its own key and every previous key the rename table records for it;
    /// the union of hits decides the resolution. A remote item claimed by
    /// more than one declared item is ambiguous for each of them.
    #[must_use]
    pub fn resolve(&self, declared: &DeclaredItemStore, remote: &[RemoteItem]) -> MatchTable {
        let index = KeyIndex::build(remote, &*self.equivalence);
        let mut diagnostics: Vec<Diagnostic> = index.duplicates(remote).collect();
        for diagnostic in &diagnostics {
            warn!(%diagnostic, "remote listing contains duplicate keys");
        }

        let found: Vec<Vec<usize>> = declared
            .iter()
            .map(|item| self.candidates(item, &index))
            .collect();
        let mut claims: HashMap<usize, usize> = HashMap::new();
        for hits in &found {
            if let [only] = hits.as_slice() {
                *claims.entry(*only).or_default() += 1;
            }
        }

        let entries = declared
            .iter()
            .zip(&found)
            .enumerate()
            .map(|(position, (item, hits))| {
                let resolution = match hits.as_slice() {
                    [] => Resolution::Unmatched,
                    [only] if claims.get(only).is_some_and(|count| *count > 1) => {
                        ambiguous(item, hits, remote, &mut diagnostics)
                    }
                    [only] => Resolution::Matched(*only),
                    several => ambiguous(item, several, remote, &mut diagnostics),
                };
                MatchEntry {
                    position,
                    resolution,
                }
            })
            .collect();

        MatchTable {
            entries,
            diagnostics,
        }
    }

    fn candidates(&self, item: &DeclaredItem, index: &KeyIndex) -> Vec<usize> {
        let equivalence = &*self.equivalence;
        let mut found: Vec<usize> = Vec::new();
        let previous = self.renames.previous_keys(item.key(), equivalence);
        let keys = std::iter::once(item.key()).chain(previous);
        for key in keys {
            for &hit in index.lookup(&equivalence.canonical(key)) {
                if !found.contains(&hit) {
                    found.push(hit);
                }
            }
        }
        found
    }
}

/// Records an ambiguous match for `item` over the snapshot `indices`.
fn ambiguous(
    item: &DeclaredItem,
    indices: &[usize],
    remote: &[RemoteItem],
    diagnostics: &mut Vec<Diagnostic>,
) -> Resolution {
    let ids: Vec<RemoteId> = indices
        .iter()
        .filter_map(|&i| remote.get(i).map(|found| found.remote_id))
        .collect();
    let diagnostic = Diagnostic::AmbiguousMatch {
        key: item.key().to_owned(),
        candidates: ids.clone(),
    };
    warn!(%diagnostic, "declared item cannot be matched unambiguously");
    diagnostics.push(diagnostic);
    Resolution::Ambiguous(ids)
}
