//! In-memory remote tracker for tests and dry runs.

use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use crate::sync::{
    domain::{
        ArtifactPath, BranchName, CommitSha, ItemChanges, ItemField, PullRequestNumber, RemoteId,
        RemoteItem,
    },
    ports::{
        BranchHead, CommitHandle, FileCommit, ItemPage, ItemQuery, NewItem, NewPullRequest,
        PullRequestChanges, PullRequestHandle, RefHandle, RemoteError, RemoteResult,
        RemoteTracker,
    },
};

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_PAGE_SIZE: usize = 30;

/// Remote operation names used for failure injection and call inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    /// [`RemoteTracker::list_items`].
    ListItems,
    /// [`RemoteTracker::create_item`].
    CreateItem,
    /// [`RemoteTracker::update_item`].
    UpdateItem,
    /// [`RemoteTracker::default_branch`].
    DefaultBranch,
    /// [`RemoteTracker::create_ref`].
    CreateRef,
    /// [`RemoteTracker::fetch_file`].
    FetchFile,
    /// [`RemoteTracker::commit_file`].
    CommitFile,
    /// [`RemoteTracker::create_pull_request`].
    CreatePullRequest,
    /// [`RemoteTracker::update_pull_request`].
    UpdatePullRequest,
}

impl RemoteOperation {
    /// Returns whether the operation mutates remote state.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::CreateItem
                | Self::UpdateItem
                | Self::CreateRef
                | Self::CommitFile
                | Self::CreatePullRequest
                | Self::UpdatePullRequest
        )
    }
}

/// One recorded call, logged before any injected failure is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// Listing of one page.
    ListItems {
        /// Requested page.
        page: u32,
    },
    /// Item creation.
    CreateItem {
        /// Submitted title.
        title: String,
    },
    /// Item update.
    UpdateItem {
        /// Target item.
        id: RemoteId,
        /// Fields carried by the update.
        fields: Vec<ItemField>,
    },
    /// Default branch lookup.
    DefaultBranch,
    /// Ref creation.
    CreateRef {
        /// Requested branch.
        name: String,
    },
    /// File read.
    FetchFile {
        /// Branch read from.
        branch: String,
        /// Path read.
        path: String,
    },
    /// File commit.
    CommitFile {
        /// Target branch.
        branch: String,
        /// Committed path.
        path: String,
    },
    /// Pull request creation.
    CreatePullRequest {
        /// Head branch.
        head: String,
    },
    /// Pull request update.
    UpdatePullRequest {
        /// Target pull request.
        number: PullRequestNumber,
        /// Fields carried by the update.
        fields: Vec<&'static str>,
    },
}

impl RemoteCall {
    /// Returns the operation of this call.
    #[must_use]
    pub const fn operation(&self) -> RemoteOperation {
        match self {
            Self::ListItems { .. } => RemoteOperation::ListItems,
            Self::CreateItem { .. } => RemoteOperation::CreateItem,
            Self::UpdateItem { .. } => RemoteOperation::UpdateItem,
            Self::DefaultBranch => RemoteOperation::DefaultBranch,
            Self::CreateRef { .. } => RemoteOperation::CreateRef,
            Self::FetchFile { .. } => RemoteOperation::FetchFile,
            Self::CommitFile { .. } => RemoteOperation::CommitFile,
            Self::CreatePullRequest { .. } => RemoteOperation::CreatePullRequest,
            Self::UpdatePullRequest { .. } => RemoteOperation::UpdatePullRequest,
        }
    }

    fn subject(&self) -> Option<String> {
        match self {
            Self::ListItems { page } => Some(page.to_string()),
            Self::CreateItem { title } => Some(title.clone()),
            Self::UpdateItem { id, .. } => Some(id.to_string()),
            Self::DefaultBranch => None,
            Self::CreateRef { name } => Some(name.clone()),
            Self::FetchFile { path, .. } | Self::CommitFile { path, .. } => Some(path.clone()),
            Self::CreatePullRequest { head } => Some(head.clone()),
            Self::UpdatePullRequest { number, .. } => Some(number.to_string()),
        }
    }
}

/// Injected failure applied to matching calls.
///
/// The subject narrows the rule to one call target: the title for
/// creations, the item number for updates, the branch name for refs, the
/// path for file operations, the head branch for pull request creation and
/// the pull request number for pull request updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRule {
    operation: RemoteOperation,
    subject: Option<String>,
    remaining: Option<usize>,
    error: RemoteError,
}

impl FailureRule {
    /// Fails every call of `operation` with `error`.
    #[must_use]
    pub const fn new(operation: RemoteOperation, error: RemoteError) -> Self {
        Self {
            operation,
            subject: None,
            remaining: None,
            error,
        }
    }

    /// Restricts the rule to calls targeting `subject`.
    #[must_use]
    pub fn for_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Expires the rule after `count` failures.
    #[must_use]
    pub const fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    fn applies_to(&self, call: &RemoteCall) -> bool {
        self.operation == call.operation()
            && self.remaining != Some(0)
            && self
                .subject
                .as_ref()
                .is_none_or(|subject| call.subject().as_ref() == Some(subject))
    }
}

/// Pull request stored by [`InMemoryTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    /// Pull request number.
    pub number: PullRequestNumber,
    /// Current fields.
    pub request: NewPullRequest,
    /// Whether the pull request is open.
    pub open: bool,
}

impl PullRequestRecord {
    fn handle(&self, existed: bool) -> PullRequestHandle {
        PullRequestHandle {
            number: self.number,
            existed,
            title: self.request.title.clone(),
            body: self.request.body.clone(),
            labels: self.request.labels.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BranchState {
    commits: Vec<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl BranchState {
    fn tip(&self) -> Option<&str> {
        self.commits.last().map(String::as_str)
    }
}

#[derive(Debug)]
struct TrackerState {
    items: BTreeMap<RemoteId, RemoteItem>,
    next_number: u64,
    branches: HashMap<String, BranchState>,
    pull_requests: Vec<PullRequestRecord>,
    page_size: usize,
    failures: Vec<FailureRule>,
    calls: Vec<RemoteCall>,
    object_counter: u64,
}

impl Default for TrackerState {
    fn default() -> Self {
        let root = BranchState {
            commits: vec![object_name(&[DEFAULT_BRANCH.as_bytes()], 0)],
            files: BTreeMap::new(),
        };
        Self {
            items: BTreeMap::new(),
            next_number: 1,
            branches: HashMap::from([(DEFAULT_BRANCH.to_owned(), root)]),
            pull_requests: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            failures: Vec::new(),
            calls: Vec::new(),
            object_counter: 0,
        }
    }
}

impl TrackerState {
    /// Logs `call` and returns the first matching injected failure.
    fn record(&mut self, call: RemoteCall) -> RemoteResult<()> {
        let injected = self
            .failures
            .iter_mut()
            .find(|rule| rule.applies_to(&call))
            .map(|rule| {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(1);
                }
                rule.error.clone()
            });
        self.calls.push(call);
        self.failures.retain(|rule| rule.remaining != Some(0));
        injected.map_or(Ok(()), Err)
    }

    fn allocate_number(&mut self) -> u64 {
        let number = self.next_number;
        self.next_number = self.next_number.saturating_add(1);
        number
    }

    fn next_object(&mut self, parts: &[&[u8]]) -> String {
        self.object_counter = self.object_counter.saturating_add(1);
        object_name(parts, self.object_counter)
    }
}

/// Derives a deterministic 40-character object name.
fn object_name(parts: &[&[u8]], counter: u64) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0_u8]);
    }
    hasher.update(counter.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .take(20)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn commit_sha(value: &str) -> RemoteResult<CommitSha> {
    CommitSha::new(value).map_err(|err| RemoteError::transient(err.to_string()))
}

fn branch_name(value: &str) -> RemoteResult<BranchName> {
    BranchName::new(value).map_err(|err| RemoteError::transient(err.to_string()))
}

fn lock_error(err: impl std::fmt::Display) -> RemoteError {
    RemoteError::transient(format!("tracker state lock poisoned: {err}"))
}

/// Thread-safe tracker double with a call log and failure injection.
///
/// Issues and pull requests share one number sequence, and the repository
/// starts with a single `main` branch. Item timestamps come from the
/// injected clock.
#[derive(Clone)]
pub struct InMemoryTracker {
    state: Arc<RwLock<TrackerState>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for InMemoryTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTracker")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            clock: Arc::new(DefaultClock),
        }
    }
}

impl InMemoryTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the clock used to stamp created and updated items.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seeds the tracker with existing items.
    #[must_use]
    pub fn with_items(self, items: impl IntoIterator<Item = RemoteItem>) -> Self {
        for item in items {
            self.insert_item(item);
        }
        self
    }

    /// Sets the listing page size.
    #[must_use]
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.setup().page_size = page_size.max(1);
        self
    }

    /// Inserts or replaces an item, bypassing the call log.
    pub fn insert_item(&self, item: RemoteItem) {
        let mut state = self.setup();
        let following = item.remote_id.value().saturating_add(1);
        state.next_number = state.next_number.max(following);
        state.items.insert(item.remote_id, item);
    }

    /// Registers an injected failure.
    pub fn inject(&self, rule: FailureRule) {
        self.setup().failures.push(rule);
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.setup().failures.clear();
    }

    /// Returns the call log.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.setup().calls.clone()
    }

    /// Empties the call log.
    pub fn clear_calls(&self) {
        self.setup().calls.clear();
    }

    /// Returns the logged calls of one operation.
    #[must_use]
    pub fn calls_of(&self, operation: RemoteOperation) -> Vec<RemoteCall> {
        self.setup()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .cloned()
            .collect()
    }

    /// Returns how many mutating calls were logged.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.setup()
            .calls
            .iter()
            .filter(|call| call.operation().is_mutation())
            .count()
    }

    /// Returns every item ordered by number.
    #[must_use]
    pub fn items(&self) -> Vec<RemoteItem> {
        self.setup().items.values().cloned().collect()
    }

    /// Returns one item.
    #[must_use]
    pub fn item(&self, id: RemoteId) -> Option<RemoteItem> {
        self.setup().items.get(&id).cloned()
    }

    /// Returns every pull request in creation order.
    #[must_use]
    pub fn pull_requests(&self) -> Vec<PullRequestRecord> {
        self.setup().pull_requests.clone()
    }

    /// Returns the tip of `branch`.
    #[must_use]
    pub fn branch_tip(&self, branch: &str) -> Option<String> {
        self.setup()
            .branches
            .get(branch)
            .and_then(BranchState::tip)
            .map(ToOwned::to_owned)
    }

    /// Returns the number of commits on `branch`, including its base.
    #[must_use]
    pub fn commit_count(&self, branch: &str) -> usize {
        self.setup()
            .branches
            .get(branch)
            .map_or(0, |state| state.commits.len())
    }

    /// Returns the content of `path` on `branch`.
    #[must_use]
    pub fn file(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        self.setup()
            .branches
            .get(branch)
            .and_then(|state| state.files.get(path).cloned())
    }

    /// Locks state for setup and inspection helpers, which never fail.
    fn setup(&self) -> RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RemoteResult<RwLockWriteGuard<'_, TrackerState>> {
        self.state.write().map_err(lock_error)
    }
}

fn matches_query(item: &RemoteItem, query: &ItemQuery) -> bool {
    query.state.admits(item.state)
        && query.labels.is_subset(&item.labels)
        && query.since.is_none_or(|since| item.updated_at >= since)
}

#[async_trait]
impl RemoteTracker for InMemoryTracker {
    async fn list_items(&self, query: &ItemQuery, page: u32) -> RemoteResult<ItemPage> {
        let mut state = self.write()?;
        state.record(RemoteCall::ListItems { page })?;

        let page_index = usize::try_from(page.max(1).saturating_sub(1)).unwrap_or(usize::MAX);
        let offset = page_index.saturating_mul(state.page_size);
        let selected: Vec<&RemoteItem> = state
            .items
            .values()
            .filter(|item| matches_query(item, query))
            .collect();
        let items: Vec<RemoteItem> = selected
            .iter()
            .skip(offset)
            .take(state.page_size)
            .map(|item| (*item).clone())
            .collect();
        let has_more = selected.len() > offset.saturating_add(state.page_size);
        Ok(ItemPage {
            items,
            next_page: has_more.then(|| page.max(1).saturating_add(1)),
        })
    }

    async fn create_item(&self, item: &NewItem) -> RemoteResult<RemoteItem> {
        let mut state = self.write()?;
        state.record(RemoteCall::CreateItem {
            title: item.title.clone(),
        })?;
        if item.title.trim().is_empty() {
            return Err(RemoteError::validation("title must not be blank"));
        }

        let number = state.allocate_number();
        let remote_id =
            RemoteId::new(number).map_err(|err| RemoteError::transient(err.to_string()))?;
        let mut created = RemoteItem::new(remote_id, item.title.clone(), self.clock.utc());
        created.body.clone_from(&item.body);
        created.labels.clone_from(&item.labels);
        created.assignees.clone_from(&item.assignees);
        created.milestone.clone_from(&item.milestone);
        state.items.insert(remote_id, created.clone());
        Ok(created)
    }

    async fn update_item(&self, id: RemoteId, changes: &ItemChanges) -> RemoteResult<RemoteItem> {
        let mut state = self.write()?;
        state.record(RemoteCall::UpdateItem {
            id,
            fields: changes.changed_fields(),
        })?;
        if changes.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(RemoteError::validation("title must not be blank"));
        }

        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| RemoteError::not_found(format!("issue #{id}")))?;
        changes.apply_to(item);
        item.updated_at = self.clock.utc();
        Ok(item.clone())
    }

    async fn default_branch(&self) -> RemoteResult<BranchHead> {
        let mut state = self.write()?;
        state.record(RemoteCall::DefaultBranch)?;
        let tip = state
            .branches
            .get(DEFAULT_BRANCH)
            .and_then(BranchState::tip)
            .ok_or_else(|| RemoteError::not_found(format!("branch {DEFAULT_BRANCH}")))?;
        Ok(BranchHead {
            name: branch_name(DEFAULT_BRANCH)?,
            sha: commit_sha(tip)?,
        })
    }

    async fn create_ref(&self, name: &BranchName, from: &CommitSha) -> RemoteResult<RefHandle> {
        let mut state = self.write()?;
        state.record(RemoteCall::CreateRef {
            name: name.to_string(),
        })?;

        if let Some(existing) = state.branches.get(name.as_str()) {
            let tip = existing
                .tip()
                .ok_or_else(|| RemoteError::transient(format!("branch {name} has no commits")))?;
            return Ok(RefHandle {
                name: name.clone(),
                sha: commit_sha(tip)?,
                existed: true,
            });
        }

        let base = state
            .branches
            .values()
            .find(|branch| branch.commits.iter().any(|sha| sha == from.as_str()))
            .ok_or_else(|| RemoteError::validation(format!("unknown commit {from}")))?;
        let created = BranchState {
            commits: vec![from.to_string()],
            files: base.files.clone(),
        };
        state.branches.insert(name.to_string(), created);
        Ok(RefHandle {
            name: name.clone(),
            sha: from.clone(),
            existed: false,
        })
    }

    async fn fetch_file(
        &self,
        branch: &BranchName,
        path: &ArtifactPath,
    ) -> RemoteResult<Option<Vec<u8>>> {
        let mut state = self.write()?;
        state.record(RemoteCall::FetchFile {
            branch: branch.to_string(),
            path: path.to_string(),
        })?;
        let target = state
            .branches
            .get(branch.as_str())
            .ok_or_else(|| RemoteError::not_found(format!("branch {branch}")))?;
        Ok(target.files.get(path.as_str()).cloned())
    }

    async fn commit_file(&self, commit: &FileCommit) -> RemoteResult<CommitHandle> {
        let mut state = self.write()?;
        state.record(RemoteCall::CommitFile {
            branch: commit.branch.to_string(),
            path: commit.path.to_string(),
        })?;
        if !state.branches.contains_key(commit.branch.as_str()) {
            return Err(RemoteError::not_found(format!("branch {}", commit.branch)));
        }

        let sha = state.next_object(&[
            commit.branch.as_str().as_bytes(),
            commit.path.as_str().as_bytes(),
            commit.content.as_slice(),
        ]);
        let target = state
            .branches
            .get_mut(commit.branch.as_str())
            .ok_or_else(|| RemoteError::not_found(format!("branch {}", commit.branch)))?;
        target
            .files
            .insert(commit.path.to_string(), commit.content.clone());
        target.commits.push(sha.clone());
        Ok(CommitHandle {
            sha: commit_sha(&sha)?,
        })
    }

    async fn create_pull_request(
        &self,
        pull_request: &NewPullRequest,
    ) -> RemoteResult<PullRequestHandle> {
        let mut state = self.write()?;
        state.record(RemoteCall::CreatePullRequest {
            head: pull_request.head.to_string(),
        })?;
        if !state.branches.contains_key(pull_request.head.as_str()) {
            return Err(RemoteError::validation(format!(
                "head branch {} does not exist",
                pull_request.head
            )));
        }

        if let Some(existing) = state
            .pull_requests
            .iter()
            .find(|record| record.open && record.request.head == pull_request.head)
        {
            return Ok(existing.handle(true));
        }

        let number = PullRequestNumber::new(state.allocate_number())
            .map_err(|err| RemoteError::transient(err.to_string()))?;
        let record = PullRequestRecord {
            number,
            request: pull_request.clone(),
            open: true,
        };
        let handle = record.handle(false);
        state.pull_requests.push(record);
        Ok(handle)
    }

    async fn update_pull_request(
        &self,
        number: PullRequestNumber,
        changes: &PullRequestChanges,
    ) -> RemoteResult<PullRequestHandle> {
        let mut state = self.write()?;
        state.record(RemoteCall::UpdatePullRequest {
            number,
            fields: changes.changed_fields(),
        })?;
        if changes.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(RemoteError::validation("title must not be blank"));
        }

        let record = state
            .pull_requests
            .iter_mut()
            .find(|record| record.number == number)
            .ok_or_else(|| RemoteError::not_found(format!("pull request #{number}")))?;
        if let Some(title) = &changes.title {
            record.request.title.clone_from(title);
        }
        if let Some(body) = &changes.body {
            record.request.body.clone_from(body);
        }
        if let Some(labels) = &changes.labels {
            record.request.labels.clone_from(labels);
        }
        Ok(record.handle(true))
    }
}
