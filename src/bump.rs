//! Overwriting a single file in a repository through a pull request, e.g. to bump an artifact version from the
//! CI pipeline that built it.

use crate::{
    errors::PromoterResult,
    forge::{create_branch, create_commit_on, open_pull_request, Forge, NewPullRequest, PullRequestRef},
    retry::merge_pull_request,
    sync::TreeMutation,
};
use tracing::info;

/// A request to overwrite one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BumpRequest {
    /// The repository-relative path of the file to overwrite.
    pub target_file: String,
    /// The new content of the file.
    pub content: String,
    /// The `owner/repo` whose pipeline triggered the bump.
    pub triggering_repo: String,
    /// The commit of the triggering repository.
    pub triggering_sha: String,
    /// The login to assign the PR to.
    pub triggering_actor: String,
    /// Merge the PR right after opening it.
    pub auto_merge: bool,
}

impl BumpRequest {
    fn branch_name(&self) -> String {
        format!("artifact_version_bump/{}/{}", self.triggering_repo, self.triggering_sha)
    }

    fn commit_message(&self) -> String {
        format!("Bumping version @ {}", self.target_file)
    }

    fn title(&self) -> String {
        format!("{}🚠 Bumping version @ {}", self.triggering_repo, self.target_file)
    }

    fn body(&self) -> String {
        format!(
            "Bumping version triggered by {}@{}",
            self.triggering_repo, self.triggering_sha
        )
    }
}

/// Overwrites `request.target_file` on the default branch through a new pull request.
///
/// ## Returns
/// - The PR that was opened.
pub async fn bump_version_overwrite(forge: &dyn Forge, request: &BumpRequest) -> PromoterResult<PullRequestRef> {
    let default_branch = forge.default_branch().await?;
    let mutations = vec![TreeMutation::WriteFile {
        path: request.target_file.clone(),
        content: request.content.clone(),
    }];

    let commit = create_commit_on(forge, &default_branch, &mutations, &request.commit_message()).await?;
    let head = create_branch(forge, &commit, &request.branch_name()).await?;

    let pr = NewPullRequest {
        title: request.title(),
        body: request.body(),
        head,
        base: default_branch,
    };
    let opened = open_pull_request(forge, &pr, &[], Some(&request.triggering_actor)).await?;

    if request.auto_merge {
        info!(pr = opened.number, "Auto-merging version bump PR");
        merge_pull_request(forge, opened.number).await?;
    }
    Ok(opened)
}
