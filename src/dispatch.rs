//! Routes inbound events to their workflows.
//!
//! Every event runs in its own task. A failing or panicking handler is logged and never takes the process
//! down.

use crate::{
    config::Settings,
    constants::EVENT_DEADLINE,
    ctx::{EventContext, PrDetails},
    diff::DeliveryController,
    errors::{PromoterError, PromoterResult},
    events::{classify, Event, IssueCommentEvent, PullRequestEvent},
    forge::{Forge, ForgeProvider},
    promotion::PromotionPlanner,
};
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Shared, cheaply clonable event router.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    main: Arc<dyn ForgeProvider>,
    approver: Option<Arc<dyn ForgeProvider>>,
    planner: Arc<dyn PromotionPlanner>,
    delivery: Arc<dyn DeliveryController>,
    settings: Settings,
}

impl Dispatcher {
    /// Creates a new [Dispatcher].
    ///
    /// ## Takes
    /// - `main` - Resolves the identity that reads repositories, opens PRs and comments.
    /// - `approver` - Resolves the identity that approves promotion PRs, if one is configured.
    /// - `planner` - Produces promotion plans.
    /// - `delivery` - The delivery controller.
    /// - `settings` - Process-wide settings.
    pub fn new(
        main: Arc<dyn ForgeProvider>,
        approver: Option<Arc<dyn ForgeProvider>>,
        planner: Arc<dyn PromotionPlanner>,
        delivery: Arc<dyn DeliveryController>,
        settings: Settings,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                main,
                approver,
                planner,
                delivery,
                settings,
            }),
        }
    }

    /// Handles `event` on a background task.
    pub fn spawn(&self, event: Event) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            // Errors are already logged by the supervisor.
            this.supervise(event).await.ok();
        })
    }

    /// Handles `event`, converting a panic into an error and logging any failure.
    pub async fn supervise(&self, event: Event) -> PromoterResult<()> {
        let kind = event.kind().to_string();
        let result = match AssertUnwindSafe(self.handle(event)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(PromoterError::from_panic(panic)),
        };

        if let Err(e) = &result {
            error!(event_type = %kind, error = %e, "Event handling failed");
        }
        result
    }

    /// Handles `event` on the current task.
    pub async fn handle(&self, event: Event) -> PromoterResult<()> {
        match event {
            Event::PullRequest(event) => {
                let span = info_span!(
                    "event",
                    repo = %format!("{}/{}", event.repository.owner.login, event.repository.name),
                    pr = event.pull_request.number,
                    event_type = "pr",
                );
                self.handle_pull_request(&event).instrument(span).await
            }
            Event::IssueComment(event) => {
                let span = info_span!(
                    "event",
                    repo = %format!("{}/{}", event.repository.owner.login, event.repository.name),
                    pr = event.issue.number,
                    event_type = "issue_comment",
                );
                self.handle_issue_comment(&event).instrument(span).await
            }
            Event::Unhandled(event_type) => {
                debug!(%event_type, "Ignoring unhandled event type");
                Ok(())
            }
        }
    }

    async fn handle_pull_request(&self, event: &PullRequestEvent) -> PromoterResult<()> {
        let Some(kind) = classify(event) else {
            debug!(action = %event.action, "PR event triggers no workflow");
            return Ok(());
        };
        info!(%kind, "Handling PR event");

        let pr = PrDetails::from_pull_request(event);
        let forge = self.resolve_main(&pr).await?;
        let approver = self.resolve_approver(&pr).await;

        let ctx = EventContext {
            forge: forge.as_ref(),
            approver: approver.as_deref(),
            planner: self.inner.planner.as_ref(),
            delivery: self.inner.delivery.as_ref(),
            settings: &self.inner.settings,
            pr,
        };
        ctx.handle_pr_event(kind).await
    }

    async fn handle_issue_comment(&self, event: &IssueCommentEvent) -> PromoterResult<()> {
        let pr = PrDetails::from_issue_comment(event);
        let forge = self.resolve_main(&pr).await?;

        // Without the bot identity, every comment is treated as coming from someone else.
        let bot_login = match forge.bot_login().await {
            Ok(login) => login,
            Err(e) => {
                warn!(error = %e, "Could not get bot identity");
                String::new()
            }
        };
        if !bot_login.is_empty() && event.sender.login == bot_login {
            debug!(sender = %event.sender.login, "Ignoring comment event triggered by the bot itself");
            return Ok(());
        }

        let mut ctx = EventContext {
            forge: forge.as_ref(),
            approver: None,
            planner: self.inner.planner.as_ref(),
            delivery: self.inner.delivery.as_ref(),
            settings: &self.inner.settings,
            pr,
        };
        tokio::time::timeout(EVENT_DEADLINE, ctx.handle_comment(event, &bot_login))
            .await
            .map_err(|_| PromoterError::DeadlineExceeded {
                secs: EVENT_DEADLINE.as_secs(),
                during: "handling a comment event",
            })?
    }

    async fn resolve_main(&self, pr: &PrDetails) -> PromoterResult<Arc<dyn Forge>> {
        tokio::time::timeout(EVENT_DEADLINE, self.inner.main.forge_for(&pr.owner, &pr.repo))
            .await
            .map_err(|_| PromoterError::DeadlineExceeded {
                secs: EVENT_DEADLINE.as_secs(),
                during: "building a GitHub client",
            })?
    }

    /// Resolves the approver identity. A failure only disables auto approval for this event.
    async fn resolve_approver(&self, pr: &PrDetails) -> Option<Arc<dyn Forge>> {
        let provider = self.inner.approver.as_ref()?;
        match provider.forge_for(&pr.owner, &pr.repo).await {
            Ok(forge) => Some(forge),
            Err(e) => {
                warn!(owner = %pr.owner, error = %e, "Could not build approver client");
                None
            }
        }
    }
}
