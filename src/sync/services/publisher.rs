//! Branch, commit and pull request publication for one reconciled item.

use minijinja::Environment;
use mockable::Clock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::control::{CallError, RunControl};
use crate::sync::{
    config::PublicationConfig,
    domain::{
        ArtifactPath, BranchName, CommitSha, DeclaredItem, FailureReason,
        PublicationFailure, PublicationResult, PublicationStep, PublishedArtifacts, RemoteId,
    },
    ports::{
        BranchHead, FileCommit, NewPullRequest, PullRequestChanges, PullRequestHandle, RefHandle,
        RemoteTracker,
    },
};

const CLOSING_KEYWORDS: [&str; 9] = [
    "close", "closes", "closed", "fix", "fixes", "fixed", "resolve", "resolves", "resolved",
];

/// Returns whether `body` contains a closing reference to `remote_id`.
///
/// A reference is one of the closing keywords, whitespace, then
/// `#<remote_id>` not followed by another digit. Matching ignores case.
///
/// # Examples
///
///     use tracksync::sync::domain::RemoteId;
///     use tracksync::sync::services::has_closing_keyword;
///
///     let id = RemoteId::new(1).expect("valid");
///     assert!(has_closing_keyword("This PR fixes #1.", id));
///     assert!(!has_closing_keyword("This PR fixes #11", id));
#[must_use]
pub fn has_closing_keyword(body: &str, remote_id: RemoteId) -> bool {
    let lowered = body.to_lowercase();
    let number = remote_id.to_string();
    CLOSING_KEYWORDS.iter().any(|keyword| {
        lowered.match_indices(keyword).any(|(start, _)| {
            let preceded_by_word = lowered
                .get(..start)
                .and_then(|head| head.chars().next_back())
                .is_some_and(char::is_alphanumeric);
            !preceded_by_word
                && lowered
                    .get(start.saturating_add(keyword.len())..)
                    .is_some_and(|rest| references_number(rest, &number))
        })
    })
}

fn references_number(rest: &str, number: &str) -> bool {
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        return false;
    }
    trimmed
        .strip_prefix('#')
        .and_then(|reference| reference.strip_prefix(number))
        .is_some_and(|after| !after.starts_with(|ch: char| ch.is_ascii_digit()))
}

/// Appends `Closes #<remote_id>` unless `body` already links the item.
#[must_use]
pub fn ensure_closing_reference(body: String, remote_id: RemoteId) -> String {
    if has_closing_keyword(&body, remote_id) {
        body
    } else if body.trim().is_empty() {
        format!("Closes #{remote_id}")
    } else {
        format!("{body}\n\nCloses #{remote_id}")
    }
}

/// Publication state machine. Each state names the next step to run.
enum PublicationState {
    BranchCreate,
    CommitArtifacts {
        base: BranchName,
        branch: RefHandle,
    },
    PullRequestCreate(PendingPullRequest),
    Published(PublishedArtifacts),
}

/// Branch state carried into the pull request step.
struct PendingPullRequest {
    base: BranchName,
    branch: RefHandle,
    tip: CommitSha,
    committed: Vec<ArtifactPath>,
}

impl PublicationState {
    const fn step(&self) -> PublicationStep {
        match self {
            Self::BranchCreate | Self::Published(_) => PublicationStep::BranchCreate,
            Self::CommitArtifacts { .. } => PublicationStep::CommitArtifacts,
            Self::PullRequestCreate(_) => PublicationStep::PullRequestCreate,
        }
    }

    fn branch(&self) -> Option<BranchName> {
        match self {
            Self::BranchCreate => None,
            Self::CommitArtifacts { branch, .. }
            | Self::PullRequestCreate(PendingPullRequest { branch, .. }) => {
                Some(branch.name.clone())
            }
            Self::Published(done) => Some(done.branch.clone()),
        }
    }
}

/// Publishes an item's artifacts as a branch, commits and a pull request.
///
/// Steps run strictly in order and stop at the first failure without
/// rolling back. Re-running is safe: an existing branch is reused,
/// unchanged files are not recommitted, and an open pull request for the
/// branch is reused.
pub struct ArtifactPublisher<T>
where
    T: RemoteTracker + ?Sized,
{
    tracker: Arc<T>,
    config: PublicationConfig,
    default_branch: OnceCell<BranchHead>,
}

impl<T> ArtifactPublisher<T>
where
    T: RemoteTracker + ?Sized,
{
    /// Creates a publisher.
    #[must_use]
    pub fn new(tracker: Arc<T>, config: PublicationConfig) -> Self {
        Self {
            tracker,
            config,
            default_branch: OnceCell::new(),
        }
    }

    /// Returns the publication settings.
    #[must_use]
    pub const fn config(&self) -> &PublicationConfig {
        &self.config
    }

    /// Returns the branch that would hold `item`'s artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`FailureReason::InvalidBranch`] when the override or the
    /// derived name breaks ref-name rules.
    pub fn branch_for(
        &self,
        item: &DeclaredItem,
        remote_id: RemoteId,
    ) -> Result<BranchName, FailureReason> {
        let name = match item.branch() {
            Some(explicit) => BranchName::new(explicit),
            None => BranchName::derive(
                &self.config.branch_prefix,
                remote_id,
                item.key(),
                self.config.max_slug_length,
            ),
        }?;
        Ok(name)
    }

    /// Runs the publication state machine for `item`.
    pub async fn publish<C>(
        &self,
        item: &DeclaredItem,
        remote_id: RemoteId,
        control: &RunControl<C>,
    ) -> PublicationResult
    where
        C: Clock + Send + Sync,
    {
        let mut state = PublicationState::BranchCreate;
        loop {
            let step = state.step();
            let branch = state.branch();
            let next = match state {
                PublicationState::Published(done) => {
                    info!(
                        key = %item.key(),
                        %remote_id,
                        branch = %done.branch,
                        pull_request = %done.pull_request,
                        "published artifacts"
                    );
                    return PublicationResult::Published(done);
                }
                PublicationState::BranchCreate => {
                    self.create_branch(item, remote_id, control).await
                }
                PublicationState::CommitArtifacts { base, branch: handle } => {
                    self.commit_artifacts(item, remote_id, base, handle, control)
                        .await
                }
                PublicationState::PullRequestCreate(pending) => {
                    self.open_pull_request(item, remote_id, pending, control)
                        .await
                }
            };

            match next {
                Ok(advanced) => state = advanced,
                Err(reason) => {
                    info!(key = %item.key(), %remote_id, %step, %reason, "publication failed");
                    return PublicationResult::Failed(PublicationFailure {
                        step,
                        reason,
                        branch,
                    });
                }
            }
        }
    }

    async fn create_branch<C>(
        &self,
        item: &DeclaredItem,
        remote_id: RemoteId,
        control: &RunControl<C>,
    ) -> Result<PublicationState, FailureReason>
    where
        C: Clock + Send + Sync,
    {
        let name = self.branch_for(item, remote_id)?;
        let base = self.default_branch(control).await?;
        let handle = control
            .call(|| self.tracker.create_ref(&name, &base.sha))
            .await?;
        debug!(branch = %handle.name, reused = handle.existed, "publication branch ready");
        Ok(PublicationState::CommitArtifacts {
            base: base.name.clone(),
            branch: handle,
        })
    }

    async fn commit_artifacts<C>(
        &self,
        item: &DeclaredItem,
        remote_id: RemoteId,
        base: BranchName,
        branch: RefHandle,
        control: &RunControl<C>,
    ) -> Result<PublicationState, FailureReason>
    where
        C: Clock + Send + Sync,
    {
        let artifacts = item
            .artifacts()
            .iter()
            .map(|artifact| ArtifactPath::new(artifact.path()).map(|path| (path, artifact)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tip = branch.sha.clone();
        let mut committed = Vec::new();
        for (path, artifact) in artifacts {
            let current = control
                .call(|| self.tracker.fetch_file(&branch.name, &path))
                .await?;
            if current.as_deref() == Some(artifact.content()) {
                debug!(branch = %branch.name, %path, "artifact already up to date");
                continue;
            }

            let message = render_template(
                &self.config.commit_message_template,
                template_context(item, remote_id, Some(&path)),
            )?;
            let commit = FileCommit {
                branch: branch.name.clone(),
                path: path.clone(),
                content: artifact.content().to_vec(),
                message,
            };
            let handle = control.call(|| self.tracker.commit_file(&commit)).await?;
            debug!(branch = %branch.name, %path, sha = %handle.sha, "committed artifact");
            tip = handle.sha;
            committed.push(path);
        }

        Ok(PublicationState::PullRequestCreate(PendingPullRequest {
            base,
            branch,
            tip,
            committed,
        }))
    }

    async fn open_pull_request<C>(
        &self,
        item: &DeclaredItem,
        remote_id: RemoteId,
        pending: PendingPullRequest,
        control: &RunControl<C>,
    ) -> Result<PublicationState, FailureReason>
    where
        C: Clock + Send + Sync,
    {
        let PendingPullRequest {
            base,
            branch,
            tip,
            committed,
        } = pending;
        let rendered = render_template(
            &self.config.pull_request_body_template,
            template_context(item, remote_id, None),
        )?;
        let request = NewPullRequest {
            title: item.pull_request_title().to_owned(),
            head: branch.name.clone(),
            base,
            body: ensure_closing_reference(rendered, remote_id),
            labels: item.labels().clone(),
        };
        let handle = control
            .call(|| self.tracker.create_pull_request(&request))
            .await?;
        let refreshed_fields = if handle.existed {
            self.refresh_pull_request(&request, &handle, control).await?
        } else {
            Vec::new()
        };

        Ok(PublicationState::Published(PublishedArtifacts {
            branch: branch.name,
            commit_sha: tip,
            pull_request: handle.number,
            reused_branch: branch.existed,
            reused_pull_request: handle.existed,
            refreshed_fields,
            committed_paths: committed,
        }))
    }

    /// Brings a reused pull request's title, body and labels in line with
    /// `request`, sending only the fields that differ.
    async fn refresh_pull_request<C>(
        &self,
        request: &NewPullRequest,
        current: &PullRequestHandle,
        control: &RunControl<C>,
    ) -> Result<Vec<&'static str>, FailureReason>
    where
        C: Clock + Send + Sync,
    {
        let changes = PullRequestChanges::between(request, current);
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let fields = changes.changed_fields();
        control
            .call(|| self.tracker.update_pull_request(current.number, &changes))
            .await?;
        debug!(pull_request = %current.number, ?fields, "refreshed reused pull request");
        Ok(fields)
    }

    async fn default_branch<C>(&self, control: &RunControl<C>) -> Result<&BranchHead, CallError>
    where
        C: Clock + Send + Sync,
    {
        self.default_branch
            .get_or_try_init(|| control.call(|| self.tracker.default_branch()))
            .await
    }
}

fn template_context(
    item: &DeclaredItem,
    remote_id: RemoteId,
    path: Option<&ArtifactPath>,
) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("remote_id".to_owned(), Value::from(remote_id.value()));
    context.insert("key".to_owned(), Value::String(item.key().to_owned()));
    context.insert("body".to_owned(), Value::String(item.body().to_owned()));
    context.insert(
        "path".to_owned(),
        path.map_or(Value::Null, |found| Value::String(found.to_string())),
    );
    context
}

fn render_template(template: &str, context: Map<String, Value>) -> Result<String, FailureReason> {
    let environment = Environment::new();
    environment
        .render_str(template, context)
        .map_err(|error| FailureReason::Template {
            message: error.to_string(),
        })
}
