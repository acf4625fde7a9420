//! Port contracts for tracker synchronization.
//!
//! Ports define the infrastructure-agnostic remote capability consumed by
//! the services.

pub mod remote;

#[cfg(test)]
pub use remote::MockRemoteTracker;
pub use remote::{
    BranchHead, CommitHandle, FileCommit, ItemPage, ItemQuery, NewItem, NewPullRequest,
    PullRequestChanges, PullRequestHandle, RefHandle, RemoteError, RemoteResult, RemoteTracker,
};
