//! In-memory adapter for the remote tracker port.

mod tracker;

pub use tracker::{FailureRule, InMemoryTracker, PullRequestRecord, RemoteCall, RemoteOperation};
