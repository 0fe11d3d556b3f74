//! Commit, branch and pull request creation, composed from the raw [Forge] primitives.

use super::{Forge, ForgeResult, NewPullRequest, PullRequestRef};
use crate::sync::TreeMutation;
use tracing::{debug, error, info, warn};

/// Creates a commit that applies `mutations` on top of the head of `base_branch`.
///
/// ## Takes
/// - `forge` - The repository to commit to.
/// - `base_branch` - The branch whose head becomes the parent commit.
/// - `mutations` - The tree mutations to apply.
/// - `message` - The commit message.
///
/// ## Returns
/// - The identity of the new commit. No ref points at it yet.
pub async fn create_commit_on(
    forge: &dyn Forge,
    base_branch: &str,
    mutations: &[TreeMutation],
    message: &str,
) -> ForgeResult<String> {
    let head = forge.branch_head(base_branch).await.inspect_err(|e| {
        error!(branch = base_branch, error = %e, "Failed to get base branch ref");
    })?;

    let tree = forge.create_tree(&head, mutations).await.inspect_err(|e| {
        error!(error = %e, entries = ?mutations, "Failed to create git tree object");
    })?;

    let commit = forge.create_commit(message, &tree, &head).await.inspect_err(|e| {
        error!(error = %e, "Failed to create git commit");
    })?;

    debug!(%commit, parent = %head, "Created commit");
    Ok(commit)
}

/// Creates the branch `branch_name` at `commit`.
///
/// ## Returns
/// - The fully qualified ref of the new branch.
pub async fn create_branch(forge: &dyn Forge, commit: &str, branch_name: &str) -> ForgeResult<String> {
    let ref_name = format!("refs/heads/{branch_name}");
    info!(branch = branch_name, "Creating branch");
    forge.create_ref(&ref_name, commit).await.inspect_err(|e| {
        error!(ref_name = %ref_name, error = %e, "Could not create git ref");
    })?;
    Ok(ref_name)
}

/// Opens a pull request, labels it, and assigns it.
///
/// A failed assignment is logged and otherwise ignored: the author of the original change may no longer be
/// assignable.
///
/// ## Takes
/// - `forge` - The repository to open the PR in.
/// - `pr` - The PR to open.
/// - `labels` - Labels to add to the new PR.
/// - `assignee` - The login to assign, if any.
///
/// ## Returns
/// - The number and URL of the new PR.
pub async fn open_pull_request(
    forge: &dyn Forge,
    pr: &NewPullRequest,
    labels: &[&str],
    assignee: Option<&str>,
) -> ForgeResult<PullRequestRef> {
    let opened = forge.create_pull_request(pr).await.inspect_err(|e| {
        error!(head = %pr.head, error = %e, "Could not create pull request");
    })?;
    info!(pr = opened.number, url = %opened.html_url, "Opened pull request");

    if !labels.is_empty() {
        let labels = labels.iter().map(|l| l.to_string()).collect::<Vec<_>>();
        forge.add_labels(opened.number, &labels).await.inspect_err(|e| {
            error!(pr = opened.number, error = %e, "Could not label pull request");
        })?;
    }

    if let Some(assignee) = assignee.filter(|a| !a.is_empty()) {
        match forge.add_assignees(opened.number, &[assignee.to_string()]).await {
            Ok(()) => debug!(pr = opened.number, assignee, "Set assignee"),
            Err(e) => warn!(pr = opened.number, assignee, error = %e, "Could not set assignee on PR"),
        }
    }

    Ok(opened)
}
