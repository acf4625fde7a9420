//! Remote-to-declarative translation.

use tracing::warn;

use crate::sync::domain::{DeclaredItem, ItemPredicate, RemoteItem};

/// Maps remote items back into declared items.
///
/// The mapping copies every field the reconciliation diff compares, so an
/// exported item reconciled against the same remote state is unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportTranslator;

impl ExportTranslator {
    /// Creates a translator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Translates the items selected by `filter`, in listing order.
    ///
    /// Items whose key is blank cannot be declared and are left out.
    pub fn export<P>(&self, items: &[RemoteItem], filter: &P) -> Vec<DeclaredItem>
    where
        P: ItemPredicate + ?Sized,
    {
        items
            .iter()
            .filter(|item| filter.matches(item))
            .filter_map(|item| {
                let declared = self.translate(item);
                if declared.is_none() {
                    warn!(remote_id = %item.remote_id, "skipping remote item with blank key");
                }
                declared
            })
            .collect()
    }

    /// Translates one remote item.
    #[must_use]
    pub fn translate(&self, item: &RemoteItem) -> Option<DeclaredItem> {
        let mut declared = DeclaredItem::new(item.key.clone())
            .ok()?
            .with_body(item.body.clone())
            .with_labels(item.labels.iter().cloned())
            .with_assignees(item.assignees.iter().cloned())
            .with_state(item.state);
        if let Some(milestone) = &item.milestone {
            declared = declared.with_milestone(milestone.clone());
        }
        Some(declared)
    }
}
