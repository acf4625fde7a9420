//! Service layer for tracker synchronization.

mod control;
mod engine;
mod export;
mod publisher;
mod resolver;
mod snapshot;
mod sync;

pub use control::{CallError, RunControl};
pub use engine::ReconciliationEngine;
pub use export::ExportTranslator;
pub use publisher::{ArtifactPublisher, ensure_closing_reference, has_closing_keyword};
pub use resolver::{IdentityResolver, MatchEntry, MatchTable, RenameTable, Resolution};
pub use snapshot::RemoteSnapshot;
pub use sync::{SyncService, SyncServiceError, SyncServiceResult};
