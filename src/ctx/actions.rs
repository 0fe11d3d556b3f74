//! The workflows an event can trigger.

use super::{auto_merge_comment, promotion_commit_message, promotion_pr_title, EventContext};
use crate::{
    branch::promotion_branch_name,
    chain::promotion_pr_body,
    config::{ComponentConfig, RepoConfig},
    constants::{
        BRANCH_SYNC_CHECKBOX_ID, COMMENT_TAG, EVENT_DEADLINE, GITHUB_COMMENT_MAX_SIZE, NOOP_LABEL,
        PROMOTION_LABEL,
    },
    diff::{
        is_sync_from_branch_allowed, render_diff_comments, should_display_sync_branch_checkbox,
        DiffCommentData, DiffRequest,
    },
    errors::{PromoterError, PromoterResult},
    events::{analyze_checkbox_update, IssueCommentEvent, PrEventKind},
    forge::{create_branch, create_commit_on, open_pull_request, NewPullRequest, PullRequestRef},
    promotion::{promotion_skip_paths, PlanRequest, PromotionInstance},
    retry::merge_pull_request,
    status::CommitState,
    sync::{plan_directory_sync, TreeMutationSet},
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

impl<'a> EventContext<'a> {
    /// Runs the workflow of a classified pull request event, bracketed by commit statuses.
    ///
    /// The workflow runs under the event deadline, and a panic inside it is caught here, so the final status
    /// is always written.
    pub async fn handle_pr_event(&self, kind: PrEventKind) -> PromoterResult<()> {
        self.set_commit_status(CommitState::Pending).await;

        let workflow = AssertUnwindSafe(tokio::time::timeout(EVENT_DEADLINE, self.run_pr_workflow(kind)));
        let result = match workflow.catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PromoterError::DeadlineExceeded {
                secs: EVENT_DEADLINE.as_secs(),
                during: "handling a pull request event",
            }),
            Err(panic) => Err(PromoterError::from_panic(panic)),
        };

        match &result {
            Ok(()) => self.set_commit_status(CommitState::Success).await,
            Err(e) => {
                error!(pr = self.pr.number, %kind, error = %e, "Handling of PR event failed");
                self.set_commit_status(CommitState::Error).await;
            }
        }
        result
    }

    async fn run_pr_workflow(&self, kind: PrEventKind) -> PromoterResult<()> {
        match kind {
            PrEventKind::Merged => self.handle_merged().await,
            PrEventKind::Changed => self.handle_changed().await,
            PrEventKind::ShowPlan => self.handle_show_plan().await,
        }
    }

    /// Opens the promotion PRs planned for a merged PR, or comments the plan in dry-run mode.
    pub async fn handle_merged(&self) -> PromoterResult<()> {
        let default_branch = self.forge.default_branch().await?;
        let config = match RepoConfig::load(self.forge, &default_branch).await {
            Ok(config) => config,
            Err(e) => {
                let report = format!("Failed to get configuration\n```\n{e}\n```\n");
                if let Err(comment_err) = self.comment(&report).await {
                    warn!(pr = self.pr.number, error = %comment_err, "Could not report configuration failure");
                }
                return Err(e);
            }
        };

        // The PR branch may already be gone, so the plan is read at the default branch.
        let plan = self
            .planner
            .plan(
                self.forge,
                PlanRequest {
                    pr_number: self.pr.number,
                    labels: &self.pr.labels,
                    git_ref: &default_branch,
                },
                &config,
            )
            .await?;

        if config.dry_run_mode {
            info!(pr = self.pr.number, "Dry-run mode, commenting the plan");
            self.comment(&self.render_plan(&plan)).await?;
        } else {
            for promotion in plan.values() {
                self.open_promotion(promotion, &default_branch, &config).await?;
            }
        }

        self.set_app_revisions(&config, "HEAD").await
    }

    /// Opens one promotion PR, then approves and merges it as configured.
    ///
    /// ## Returns
    /// - `Ok(Some(pr))` - The promotion PR that was opened.
    /// - `Ok(None)` - Nothing to promote.
    async fn open_promotion(
        &self,
        promotion: &PromotionInstance,
        default_branch: &str,
        config: &RepoConfig,
    ) -> PromoterResult<Option<PullRequestRef>> {
        let metadata = &promotion.metadata;

        // Build the sync mutations. A failed pair is skipped, the others still get promoted.
        let mut mutations = TreeMutationSet::new();
        for (target, source) in &promotion.computed_sync_paths {
            match plan_directory_sync(self.forge, source, target, default_branch).await {
                Ok(entries) => {
                    debug!(source = %source, target = %target, "Generated tree entries");
                    mutations.extend(entries);
                }
                Err(e) => error!(source = %source, target = %target, error = %e, "Failed to generate tree entries"),
            }
        }
        if mutations.is_empty() {
            info!(source = %metadata.source_path, "Tree entry list is empty, skipping promotion");
            return Ok(None);
        }

        let commit = create_commit_on(
            self.forge,
            default_branch,
            &mutations,
            &promotion_commit_message(&metadata.source_path),
        )
        .await?;
        let branch = promotion_branch_name(self.pr.number, &self.pr.head_ref, &metadata.target_paths);
        let head = create_branch(self.forge, &commit, &branch).await?;

        let components = metadata.component_names.join(",");
        let original_author = self.pr.metadata.original_author_or(&self.pr.author);
        let next_metadata = self.pr.metadata.next_hop(self.pr.number, &self.pr.author, promotion);
        let body = promotion_pr_body(&components, &next_metadata, &promotion_skip_paths(promotion))?;

        let request = NewPullRequest {
            title: promotion_pr_title(&components, &metadata.target_description),
            body,
            head,
            base: default_branch.to_string(),
        };
        let opened = open_pull_request(self.forge, &request, &[PROMOTION_LABEL], Some(original_author)).await?;

        if config.auto_approve_promotion_prs {
            match self.approver {
                Some(approver) => {
                    approver.approve_pull_request(opened.number).await.inspect_err(|e| {
                        error!(pr = opened.number, error = %e, "PR auto approval failed");
                    })?;
                }
                None => warn!(pr = opened.number, "Auto approval is enabled but no approver identity is configured"),
            }
        }

        if metadata.auto_merge {
            info!(pr = opened.number, "Auto-merging promotion PR");
            self.comment(&auto_merge_comment(opened.number)).await?;
            merge_pull_request(self.forge, opened.number).await?;
        }

        Ok(Some(opened))
    }

    /// Comments the diff of the applications a changed PR affects.
    pub async fn handle_changed(&self) -> PromoterResult<()> {
        let default_branch = self.forge.default_branch().await?;
        let config = RepoConfig::load(self.forge, &default_branch).await?;
        if !config.delivery.comment_diff_on_pr {
            debug!(pr = self.pr.number, "Diff comments are disabled");
            return Ok(());
        }

        let components = self
            .planner
            .changed_components(self.forge, self.pr.number, &config)
            .await?;

        let mut to_diff = Vec::with_capacity(components.len());
        for component in &components {
            let component_config = ComponentConfig::load(self.forge, component, &self.pr.head_ref).await?;
            if component_config.disable_diff {
                debug!(component = %component, "Diff disabled for component");
            }
            to_diff.push((component.clone(), !component_config.disable_diff));
        }

        let report = self
            .delivery
            .diff_components(DiffRequest {
                components: &to_diff,
                git_ref: &self.pr.head_ref,
                repo_url: &self.pr.repo_url,
                use_sha_label: config.delivery.use_sha_label_for_app_discovery,
                create_temp_apps: config.delivery.create_temp_app_for_new_apps,
            })
            .await
            .map_err(|e| match e {
                PromoterError::Delivery(_) => e,
                other => PromoterError::Delivery(other.to_string()),
            })?;

        if !report.has_diff && !report.has_errors {
            info!(pr = self.pr.number, "Diff is empty, this PR will not change cluster state");
            if let Err(e) = self.forge.add_labels(self.pr.number, &[NOOP_LABEL.to_string()]).await {
                error!(pr = self.pr.number, error = %e, "Could not label PR");
            }

            // Without components there is no evidence the PR is harmless.
            let is_promotion = self.pr.labels.iter().any(|l| l == PROMOTION_LABEL);
            if is_promotion && config.delivery.auto_merge_no_diff_prs && !components.is_empty() {
                info!(pr = self.pr.number, "Auto-merging no-diff promotion PR");
                merge_pull_request(self.forge, self.pr.number).await?;
            }
        }

        if report.results.is_empty() {
            debug!(pr = self.pr.number, "Diff found no affected applications");
            return Ok(());
        }

        let pattern = config.delivery.branch_sync_pattern()?;
        let data = DiffCommentData {
            display_sync_branch_checkbox: should_display_sync_branch_checkbox(
                &components,
                pattern.as_ref(),
                &report.results,
            ),
            results: report.results,
            branch_name: self.pr.head_ref.clone(),
        };

        let comments = render_diff_comments(&data, GITHUB_COMMENT_MAX_SIZE - COMMENT_TAG.len())?;
        info!(pr = self.pr.number, comments = comments.len(), "Posting diff comments");
        for comment in comments {
            self.comment(&comment).await?;
        }
        Ok(())
    }

    /// Comments the promotion plan of the PR.
    pub async fn handle_show_plan(&self) -> PromoterResult<()> {
        info!(pr = self.pr.number, "Found show-plan label, posting plan");
        let default_branch = self.forge.default_branch().await?;
        let config = RepoConfig::load(self.forge, &default_branch).await?;

        let plan = self
            .planner
            .plan(
                self.forge,
                PlanRequest {
                    pr_number: self.pr.number,
                    labels: &self.pr.labels,
                    git_ref: &self.pr.head_ref,
                },
                &config,
            )
            .await?;
        self.comment(&self.render_plan(&plan)).await
    }

    /// Reacts to a comment: syncs applications from the PR branch when the bot's checkbox gets checked, and
    /// toggles commit statuses on `/<keyword>` comments.
    pub async fn handle_comment(&mut self, event: &IssueCommentEvent, bot_login: &str) -> PromoterResult<()> {
        let default_branch = self.forge.default_branch().await?;
        let config = RepoConfig::load(self.forge, &default_branch).await?;
        if let Err(e) = self.load_head().await {
            warn!(pr = self.pr.number, error = %e, "Could not get PR head, skipping branch sync and status toggles");
        }

        let is_bot_comment_edit = !bot_login.is_empty()
            && event.action == "edited"
            && event.comment.user.login == bot_login
            && event.issue.state == "open";
        if is_bot_comment_edit && !self.pr.head_ref.is_empty() {
            let (was_checked, is_checked) =
                analyze_checkbox_update(&event.comment.body, event.previous_body(), BRANCH_SYNC_CHECKBOX_ID);
            if !was_checked && is_checked {
                info!(pr = self.pr.number, "Sync checkbox was checked");
                let revision = self.pr.head_ref.clone();
                self.set_app_revisions(&config, &revision).await?;
            }
        }

        for (keyword, context) in &config.toggle_commit_status {
            if event.comment.body.contains(&format!("/{keyword}")) {
                self.toggle_commit_status(context, &event.sender.login).await?;
            }
        }
        Ok(())
    }

    /// Points the applications of every changed component that may sync from a branch at `revision`.
    ///
    /// Failures are logged per component and do not fail the workflow.
    async fn set_app_revisions(&self, config: &RepoConfig, revision: &str) -> PromoterResult<()> {
        let Some(pattern) = config.delivery.branch_sync_pattern()? else {
            return Ok(());
        };

        let components = match self
            .planner
            .changed_components(self.forge, self.pr.number, config)
            .await
        {
            Ok(components) => components,
            Err(e) => {
                error!(pr = self.pr.number, error = %e, "Failed to get list of changed components");
                Vec::new()
            }
        };

        for component in components
            .iter()
            .filter(|c| is_sync_from_branch_allowed(Some(&pattern), c))
        {
            info!(component = %component, revision, "Setting application target revision");
            if let Err(e) = self
                .delivery
                .set_app_revision(
                    component,
                    revision,
                    &self.pr.repo_url,
                    config.delivery.use_sha_label_for_app_discovery,
                )
                .await
            {
                error!(component = %component, revision, error = %e, "Failed to set application revision");
            }
        }
        Ok(())
    }

    /// Flips the commit status `context` on the PR head between success and failure.
    async fn toggle_commit_status(&self, context: &str, user: &str) -> PromoterResult<()> {
        if self.pr.head_ref.is_empty() || self.pr.sha.is_empty() {
            warn!(pr = self.pr.number, context, "PR head unknown, not toggling commit status");
            return Ok(());
        }

        let statuses = self.forge.list_statuses(&self.pr.head_ref).await?;
        let Some(current) = statuses.iter().find(|s| s.context == context) else {
            debug!(context, "No status to toggle");
            return Ok(());
        };

        let toggled = current.toggled();
        info!(user, context, from = %current.state, to = %toggled.state, "Toggled commit status");
        self.forge.create_status(&self.pr.sha, &toggled).await?;
        Ok(())
    }
}
