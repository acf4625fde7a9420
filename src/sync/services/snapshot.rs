//! Fully materialized remote listing taken once per run.

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::debug;

use super::control::{CallError, RunControl};
use crate::sync::{
    domain::RemoteItem,
    ports::{ItemQuery, RemoteTracker},
};

/// Remote items listed at the start of a run.
///
/// Every page is read before any item is processed, so all workers diff
/// against the same flat view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    items: Vec<RemoteItem>,
    taken_at: DateTime<Utc>,
}

impl RemoteSnapshot {
    /// Wraps an already materialized listing.
    #[must_use]
    pub const fn new(items: Vec<RemoteItem>, taken_at: DateTime<Utc>) -> Self {
        Self { items, taken_at }
    }

    /// Reads every page of `query`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] when a page cannot be listed.
    pub async fn fetch<T, C>(
        tracker: &T,
        control: &RunControl<C>,
        clock: &C,
        query: &ItemQuery,
    ) -> Result<Self, CallError>
    where
        T: RemoteTracker + ?Sized,
        C: Clock + Send + Sync,
    {
        let taken_at = clock.utc();
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let listing = control.call(|| tracker.list_items(query, page)).await?;
            debug!(page, count = listing.items.len(), "listed remote items");
            items.extend(listing.items);
            match listing.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        Ok(Self { items, taken_at })
    }

    /// Returns the listed items in listing order.
    #[must_use]
    pub fn items(&self) -> &[RemoteItem] {
        &self.items
    }

    /// Returns when the listing started.
    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Consumes the snapshot and returns its items.
    #[must_use]
    pub fn into_items(self) -> Vec<RemoteItem> {
        self.items
    }
}
