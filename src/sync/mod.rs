//! Declarative synchronization of issues and pull requests with a remote
//! tracker.
//!
//! A run takes an ordered list of declared items, snapshots the remote
//! tracker once, resolves each declared item to at most one remote item and
//! converges the remote side with the minimal set of calls. Items that
//! declare artifacts can additionally be published as a branch, commits and
//! a pull request linked back to the item. The reverse direction exports
//! remote items as declared items.
//!
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]
//! - Typed configuration in [`config`]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod services;
