//! Transient-failure retry decorator for any remote tracker.

use async_trait::async_trait;
use std::future::Future;
use tracing::warn;

use crate::sync::{
    config::RetryPolicy,
    domain::{
        ArtifactPath, BranchName, CommitSha, ItemChanges, PullRequestNumber, RemoteId, RemoteItem,
    },
    ports::{
        BranchHead, CommitHandle, FileCommit, ItemPage, ItemQuery, NewItem, NewPullRequest,
        PullRequestChanges, PullRequestHandle, RefHandle, RemoteResult, RemoteTracker,
    },
};

/// Retries [`RemoteError::Transient`](crate::sync::ports::RemoteError::Transient)
/// failures with bounded exponential backoff.
///
/// Every other error class passes through on the first occurrence, so the
/// services only see a transient failure once the retry budget is spent.
#[derive(Debug, Clone)]
pub struct RetryingTracker<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryingTracker<T>
where
    T: RemoteTracker,
{
    /// Wraps `inner` with `policy`.
    #[must_use]
    pub const fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the wrapped tracker.
    #[must_use]
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    async fn retry<R, F, Fut>(&self, operation: &'static str, mut call: F) -> RemoteResult<R>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = RemoteResult<R>> + Send,
        R: Send,
    {
        let mut retries = 0;
        loop {
            match call().await {
                Err(err) if err.is_transient() && retries < self.policy.max_retries => {
                    let delay = self.policy.delay_for(retries);
                    retries += 1;
                    warn!(
                        operation,
                        attempt = retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying transient remote failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<T> RemoteTracker for RetryingTracker<T>
where
    T: RemoteTracker,
{
    async fn list_items(&self, query: &ItemQuery, page: u32) -> RemoteResult<ItemPage> {
        self.retry("list_items", || self.inner.list_items(query, page))
            .await
    }

    async fn create_item(&self, item: &NewItem) -> RemoteResult<RemoteItem> {
        self.retry("create_item", || self.inner.create_item(item))
            .await
    }

    async fn update_item(&self, id: RemoteId, changes: &ItemChanges) -> RemoteResult<RemoteItem> {
        self.retry("update_item", || self.inner.update_item(id, changes))
            .await
    }

    async fn default_branch(&self) -> RemoteResult<BranchHead> {
        self.retry("default_branch", || self.inner.default_branch())
            .await
    }

    async fn create_ref(&self, name: &BranchName, from: &CommitSha) -> RemoteResult<RefHandle> {
        self.retry("create_ref", || self.inner.create_ref(name, from))
            .await
    }

    async fn fetch_file(
        &self,
        branch: &BranchName,
        path: &ArtifactPath,
    ) -> RemoteResult<Option<Vec<u8>>> {
        self.retry("fetch_file", || self.inner.fetch_file(branch, path))
            .await
    }

    async fn commit_file(&self, commit: &FileCommit) -> RemoteResult<CommitHandle> {
        self.retry("commit_file", || self.inner.commit_file(commit))
            .await
    }

    async fn create_pull_request(
        &self,
        pull_request: &NewPullRequest,
    ) -> RemoteResult<PullRequestHandle> {
        self.retry("create_pull_request", || {
            self.inner.create_pull_request(pull_request)
        })
        .await
    }

    async fn update_pull_request(
        &self,
        number: PullRequestNumber,
        changes: &PullRequestChanges,
    ) -> RemoteResult<PullRequestHandle> {
        self.retry("update_pull_request", || {
            self.inner.update_pull_request(number, changes)
        })
        .await
    }
}
