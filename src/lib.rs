//! Tracksync: declarative issue and pull request synchronization.
//!
//! This crate reconciles a declared description of tracker items (issues
//! with labels, assignees, milestones and state, plus optional file
//! artifacts) against a remote tracker. Each run creates missing items,
//! updates differing ones with the minimal set of changed fields, leaves
//! matching ones untouched, and can publish artifacts as a branch, commits
//! and a pull request that closes the item on merge. Remote items can also
//! be exported back into the declared shape.
//!
//! # Architecture
//!
//! Tracksync follows hexagonal architecture principles:
//!
//! - **Domain**: Pure value types with no infrastructure dependencies
//! - **Ports**: The remote tracker capability as an async trait
//! - **Adapters**: An in-memory tracker and a retrying decorator
//! - **Services**: Identity resolution, reconciliation, publication, export
//!
//! # Modules
//!
//! - [`sync`]: Reconciliation engine, artifact publication and export

pub mod sync;
