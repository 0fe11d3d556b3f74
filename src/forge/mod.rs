//! The hosted git API that promotions are expressed against.
//!
//! Every repository mutation goes through the low-level tree, commit and ref endpoints of the forge, so no
//! local working copy is ever needed.

use crate::{errors::PromoterResult, status::CommitStatus, sync::TreeMutation};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

mod cache;
pub use cache::{ClientCache, Credentials};

mod github;
pub use github::GitHubForge;

mod ops;
pub use ops::{create_branch, create_commit_on, open_pull_request};

#[cfg(test)]
pub(crate) mod fake;

/// An error returned by a [Forge] call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForgeError {
    /// The API answered with a non-success status.
    #[error("API returned {}: {}", .status, .message)]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message of the response.
        message: String,
    },
    /// The request never produced an API response.
    #[error("transport failure: {}", .0)]
    Transport(String),
    /// The response could not be decoded.
    #[error("unexpected response shape: {}", .0)]
    Decode(String),
}

impl ForgeError {
    /// Returns `true` if the API reported that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Returns `true` if this is the transient merge conflict GitHub asks to retry.
    pub fn is_retryable_merge(&self) -> bool {
        match self {
            Self::Api { status, message } => *status == 405 && message.contains("try the merge again"),
            _ => false,
        }
    }
}

/// A [Result] type alias where the error is [ForgeError].
pub type ForgeResult<T> = Result<T, ForgeError>;

/// The kind of an entry in a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// Anything else (symlinks, submodules).
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// The repository-relative path of the entry.
    pub path: String,
    /// The content identity of the entry.
    pub sha: String,
    /// The kind of the entry.
    pub kind: EntryKind,
}

/// The request to open a new pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    /// The PR title.
    pub title: String,
    /// The PR description.
    pub body: String,
    /// The head ref, fully qualified (`refs/heads/...`).
    pub head: String,
    /// The base branch.
    pub base: String,
}

/// A reference to a pull request that was just created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// The PR number.
    pub number: u64,
    /// The web URL of the PR.
    pub html_url: String,
}

/// The fields of an existing pull request that event handling needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestSummary {
    /// The head branch of the PR.
    pub head_ref: String,
    /// The head commit of the PR.
    pub head_sha: String,
}

/// A handle on one repository of the hosted git API.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Returns the name of the repository's default branch.
    async fn default_branch(&self) -> ForgeResult<String>;

    /// Returns the decoded content of the file at `path`, or [None] if it does not exist at `git_ref`.
    async fn get_file(&self, path: &str, git_ref: &str) -> ForgeResult<Option<String>>;

    /// Lists the directory at `path`, or returns [None] if it does not exist at `git_ref`.
    async fn list_dir(&self, path: &str, git_ref: &str) -> ForgeResult<Option<Vec<ContentEntry>>>;

    /// Returns the fields of pull request `number`.
    async fn pull_request(&self, number: u64) -> ForgeResult<PullRequestSummary>;

    /// Returns the paths of every file changed by pull request `number`.
    async fn pull_request_files(&self, number: u64) -> ForgeResult<Vec<String>>;

    /// Returns the commit `branch` points at.
    async fn branch_head(&self, branch: &str) -> ForgeResult<String>;

    /// Creates a tree on top of `base_tree` and returns its identity.
    async fn create_tree(&self, base_tree: &str, mutations: &[TreeMutation]) -> ForgeResult<String>;

    /// Creates a commit of `tree` with a single `parent` and returns its identity.
    async fn create_commit(&self, message: &str, tree: &str, parent: &str) -> ForgeResult<String>;

    /// Creates the fully qualified ref `ref_name` pointing at `sha`.
    async fn create_ref(&self, ref_name: &str, sha: &str) -> ForgeResult<()>;

    /// Opens a pull request.
    async fn create_pull_request(&self, pr: &NewPullRequest) -> ForgeResult<PullRequestRef>;

    /// Adds labels to an issue or pull request.
    async fn add_labels(&self, number: u64, labels: &[String]) -> ForgeResult<()>;

    /// Adds assignees to an issue or pull request.
    async fn add_assignees(&self, number: u64, assignees: &[String]) -> ForgeResult<()>;

    /// Posts a comment on an issue or pull request.
    async fn create_comment(&self, number: u64, body: &str) -> ForgeResult<()>;

    /// Submits an approving review on pull request `number`.
    async fn approve_pull_request(&self, number: u64) -> ForgeResult<()>;

    /// Merges pull request `number`.
    async fn merge_pull_request(&self, number: u64) -> ForgeResult<()>;

    /// Lists the commit statuses of `git_ref`.
    async fn list_statuses(&self, git_ref: &str) -> ForgeResult<Vec<CommitStatus>>;

    /// Sets a commit status on `sha`.
    async fn create_status(&self, sha: &str, status: &CommitStatus) -> ForgeResult<()>;

    /// Returns the login of the identity the forge is authenticated as.
    async fn bot_login(&self) -> ForgeResult<String>;
}

/// Hands out [Forge]s for the repositories events arrive from.
#[async_trait]
pub trait ForgeProvider: Send + Sync {
    /// Returns a [Forge] for `owner/repo`.
    async fn forge_for(&self, owner: &str, repo: &str) -> PromoterResult<Arc<dyn Forge>>;
}

#[async_trait]
impl ForgeProvider for ClientCache {
    async fn forge_for(&self, owner: &str, repo: &str) -> PromoterResult<Arc<dyn Forge>> {
        Ok(Arc::new(self.github_forge(owner, repo).await?))
    }
}
