//! The delivery controller seam, and the diff report it produces.

use crate::errors::PromoterResult;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

mod fmt;
pub use fmt::{build_diff_comment, render_diff_comments};

#[cfg(test)]
pub(crate) mod fake;

/// The diff of one Kubernetes object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObjectDiff {
    /// The namespace of the object.
    pub namespace: String,
    /// The kind of the object.
    pub kind: String,
    /// The name of the object.
    pub name: String,
    /// Unified diff text of the object.
    pub diff: String,
}

/// The diff of one application managed by the delivery controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppDiffResult {
    /// The component path the application renders.
    pub component_path: String,
    /// The application name.
    pub app_name: String,
    /// Link to the application in the delivery controller UI.
    pub app_url: String,
    /// The application health, e.g. `Healthy`.
    pub health_status: String,
    /// The application sync state, e.g. `Synced`.
    pub sync_status: String,
    /// Whether the application syncs automatically.
    pub auto_sync_enabled: bool,
    /// Whether the application was created only to render a preview.
    pub temporarily_created: bool,
    /// Whether the application already tracks the PR branch.
    pub synced_from_branch: bool,
    /// The diff failure, if any. When set, `diff_elements` is ignored.
    pub diff_error: Option<String>,
    /// Whether any object changed.
    pub has_diff: bool,
    /// Per-object diffs.
    pub diff_elements: Vec<ObjectDiff>,
}

/// Everything a diff comment is rendered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffCommentData {
    /// The applications to render, in order.
    pub results: Vec<AppDiffResult>,
    /// Offer the "sync from branch" checkbox.
    pub display_sync_branch_checkbox: bool,
    /// The PR branch the checkbox refers to.
    pub branch_name: String,
}

/// The inputs of a diff computation.
#[derive(Debug, Clone, Copy)]
pub struct DiffRequest<'a> {
    /// Component path, and whether diffing is enabled for it.
    pub components: &'a [(String, bool)],
    /// The ref the manifests are rendered from.
    pub git_ref: &'a str,
    /// The web URL of the repository.
    pub repo_url: &'a str,
    /// Discover applications by a commit SHA label.
    pub use_sha_label: bool,
    /// Create temporary applications for components that have none.
    pub create_temp_apps: bool,
}

/// The result of a diff computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// Whether any application would change.
    pub has_diff: bool,
    /// Whether any application failed to diff.
    pub has_errors: bool,
    /// Per-application results.
    pub results: Vec<AppDiffResult>,
}

/// A continuous delivery controller that renders and syncs component paths.
#[async_trait]
pub trait DeliveryController: Send + Sync {
    /// Computes the diff between the live state and the manifests at `request.git_ref`.
    async fn diff_components(&self, request: DiffRequest<'_>) -> PromoterResult<DiffReport>;

    /// Points the application of `component_path` at `revision`.
    async fn set_app_revision(
        &self,
        component_path: &str,
        revision: &str,
        repo_url: &str,
        use_sha_label: bool,
    ) -> PromoterResult<()>;
}

/// A [DeliveryController] that knows about no applications.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedController;

#[async_trait]
impl DeliveryController for DisconnectedController {
    async fn diff_components(&self, _request: DiffRequest<'_>) -> PromoterResult<DiffReport> {
        Ok(DiffReport::default())
    }

    async fn set_app_revision(
        &self,
        component_path: &str,
        revision: &str,
        _repo_url: &str,
        _use_sha_label: bool,
    ) -> PromoterResult<()> {
        warn!(component_path, revision, "No delivery controller configured, not updating application");
        Ok(())
    }
}

/// Returns `true` if the application of `path` may be synced from a PR branch.
pub fn is_sync_from_branch_allowed(pattern: Option<&Regex>, path: &str) -> bool {
    pattern.is_some_and(|re| re.is_match(path))
}

/// Decides whether the "sync from branch" checkbox is offered.
///
/// It is offered if any changed component is allowed to sync from a branch and its application is neither a
/// temporary preview nor already synced from the branch.
pub fn should_display_sync_branch_checkbox(
    component_paths: &[String],
    pattern: Option<&Regex>,
    results: &[AppDiffResult],
) -> bool {
    component_paths
        .iter()
        .filter(|p| is_sync_from_branch_allowed(pattern, p))
        .any(|p| {
            results
                .iter()
                .any(|r| &r.component_path == p && !r.temporarily_created && !r.synced_from_branch)
        })
}
