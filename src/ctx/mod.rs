//! The in-memory context of one event being handled.

use crate::{
    chain::ChainMetadata,
    config::Settings,
    constants::{COMMENT_TAG, STATUS_UPDATE_DEADLINE},
    diff::DeliveryController,
    errors::PromoterResult,
    events::{IssueCommentEvent, PullRequestEvent},
    forge::Forge,
    promotion::PromotionPlanner,
    status::{commit_status_target_url, CommitState, CommitStatus},
};
use chrono::Utc;
use tracing::{debug, error};

mod actions;
mod fmt;
pub use fmt::{auto_merge_comment, promotion_commit_message, promotion_pr_title};

/// The pull request an event is about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrDetails {
    /// The repository owner.
    pub owner: String,
    /// The repository name.
    pub repo: String,
    /// The web URL of the repository.
    pub repo_url: String,
    /// The PR number.
    pub number: u64,
    /// The login of the PR author.
    pub author: String,
    /// The head commit of the PR.
    pub sha: String,
    /// The head branch of the PR.
    pub head_ref: String,
    /// The names of the labels on the PR.
    pub labels: Vec<String>,
    /// The promotion chain metadata embedded in the PR description.
    pub metadata: ChainMetadata,
}

impl PrDetails {
    /// Extracts the PR details carried by a `pull_request` event.
    pub fn from_pull_request(event: &PullRequestEvent) -> Self {
        let pr = &event.pull_request;
        Self {
            owner: event.repository.owner.login.clone(),
            repo: event.repository.name.clone(),
            repo_url: event.repository.html_url.clone(),
            number: pr.number,
            author: pr.user.login.clone(),
            sha: pr.head.sha.clone(),
            head_ref: pr.head.git_ref.clone(),
            labels: pr.labels.iter().map(|l| l.name.clone()).collect(),
            metadata: ChainMetadata::decode(&pr.body),
        }
    }

    /// Extracts the PR details carried by an `issue_comment` event. The head is not part of the payload.
    pub fn from_issue_comment(event: &IssueCommentEvent) -> Self {
        Self {
            owner: event.repository.owner.login.clone(),
            repo: event.repository.name.clone(),
            repo_url: event.repository.html_url.clone(),
            number: event.issue.number,
            author: event.issue.user.login.clone(),
            metadata: ChainMetadata::decode(&event.issue.body),
            ..Default::default()
        }
    }

    /// Returns `owner/repo`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// The in-memory context of one event being handled.
pub struct EventContext<'a> {
    /// The repository the event is about.
    pub forge: &'a dyn Forge,
    /// The identity that approves promotion PRs, if configured.
    pub approver: Option<&'a dyn Forge>,
    /// Produces promotion plans.
    pub planner: &'a dyn PromotionPlanner,
    /// The delivery controller.
    pub delivery: &'a dyn DeliveryController,
    /// Process-wide settings.
    pub settings: &'a Settings,
    /// The PR the event is about.
    pub pr: PrDetails,
}

impl<'a> EventContext<'a> {
    /// Posts a tagged comment on the PR.
    pub async fn comment(&self, body: &str) -> PromoterResult<()> {
        let tagged = format!("{COMMENT_TAG}{body}");
        self.forge
            .create_comment(self.pr.number, &tagged)
            .await
            .inspect_err(|e| error!(pr = self.pr.number, error = %e, "Could not comment in PR"))?;
        Ok(())
    }

    /// Fills in the head of the PR, which comment payloads do not carry.
    pub async fn load_head(&mut self) -> PromoterResult<()> {
        let pr = self.forge.pull_request(self.pr.number).await?;
        self.pr.head_ref = pr.head_ref;
        self.pr.sha = pr.head_sha;
        Ok(())
    }

    /// Sets the bot's commit status on the PR head.
    ///
    /// Runs under its own deadline so that the status lands even when the event deadline is nearly spent.
    /// Failures are logged and otherwise ignored.
    pub async fn set_commit_status(&self, state: CommitState) {
        let target_url = commit_status_target_url(
            Utc::now(),
            self.settings.commit_status_url_template.as_deref(),
        )
        .await;
        let status = CommitStatus::promoter(state, target_url);
        debug!(sha = %self.pr.sha, %state, "Setting commit status");

        match tokio::time::timeout(
            STATUS_UPDATE_DEADLINE,
            self.forge.create_status(&self.pr.sha, &status),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(sha = %self.pr.sha, error = %e, "Failed to set commit status"),
            Err(_) => error!(sha = %self.pr.sha, "Timed out setting commit status"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{EventContext, PrDetails};
    use crate::{
        config::Settings,
        diff::fake::FakeDelivery,
        events::{Event, IssueCommentEvent},
        forge::fake::{Call, FakeForge},
        promotion::ConfigPlanner,
        status::CommitState,
    };

    pub(crate) fn pr_details() -> PrDetails {
        PrDetails {
            owner: "acme".to_string(),
            repo: "gitops".to_string(),
            repo_url: "https://github.com/acme/gitops".to_string(),
            number: 12,
            author: "alice".to_string(),
            sha: "abc123".to_string(),
            head_ref: "feature/x".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn details_from_comment_event() {
        let payload = r#"{
            "action": "created",
            "issue": {"number": 4, "state": "open", "body": "plain", "user": {"login": "alice"}},
            "comment": {"body": "hi", "user": {"login": "bob"}},
            "repository": {"name": "gitops", "owner": {"login": "acme"}, "html_url": "https://github.com/acme/gitops"},
            "sender": {"login": "bob"}
        }"#;
        let Event::IssueComment(event) = Event::parse("issue_comment", payload.as_bytes()).unwrap() else {
            panic!("expected an issue comment event");
        };
        let event: &IssueCommentEvent = &event;

        let details = PrDetails::from_issue_comment(event);
        assert_eq!(details.slug(), "acme/gitops");
        assert_eq!(details.number, 4);
        assert_eq!(details.author, "alice");
        assert!(details.sha.is_empty());
    }

    #[tokio::test]
    async fn comments_are_tagged_and_statuses_set() {
        let forge = FakeForge::default();
        let delivery = FakeDelivery::default();
        let settings = Settings::default();
        let ctx = EventContext {
            forge: &forge,
            approver: None,
            planner: &ConfigPlanner,
            delivery: &delivery,
            settings: &settings,
            pr: pr_details(),
        };

        ctx.comment("hello").await.unwrap();
        ctx.set_commit_status(CommitState::Pending).await;

        assert_eq!(forge.comments(), vec!["<!-- promoter_tag -->\nhello".to_string()]);
        match &forge.calls()[1] {
            Call::Status { sha, status } => {
                assert_eq!(sha, "abc123");
                assert_eq!(status.state, CommitState::Pending);
                assert_eq!(status.context, "promoter");
            }
            other => panic!("expected a status call, got {other:?}"),
        }
    }
}
