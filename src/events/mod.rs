//! Inbound webhook events, as the closed set of kinds `promoter` reacts to.

use crate::errors::{PromoterError, PromoterResult};
use serde::Deserialize;

mod classify;
pub use classify::{analyze_checkbox_update, classify, PrEventKind};

/// An account reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct User {
    /// The account login.
    pub login: String,
}

/// A label reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Label {
    /// The label name.
    pub name: String,
}

/// The head of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Head {
    /// The head branch.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// The head commit.
    pub sha: String,
}

/// The repository an event originates from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Repository {
    /// The repository name.
    pub name: String,
    /// The owning account.
    pub owner: User,
    /// The web URL of the repository.
    pub html_url: String,
}

/// The pull request of a [PullRequestEvent].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    /// The PR number.
    pub number: u64,
    /// Whether the PR was merged.
    pub merged: bool,
    /// The PR description.
    #[serde(deserialize_with = "null_as_empty")]
    pub body: String,
    /// The PR author.
    pub user: User,
    /// The PR head.
    pub head: Head,
    /// The labels on the PR.
    pub labels: Vec<Label>,
}

/// A `pull_request` webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PullRequestEvent {
    /// What happened to the PR.
    pub action: String,
    /// The label that was added, on `labeled` actions.
    pub label: Option<Label>,
    /// The PR.
    pub pull_request: PullRequest,
    /// The repository.
    pub repository: Repository,
}

/// The issue (or PR) of an [IssueCommentEvent].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Issue {
    /// The issue number.
    pub number: u64,
    /// `open` or `closed`.
    pub state: String,
    /// The issue description.
    #[serde(deserialize_with = "null_as_empty")]
    pub body: String,
    /// The issue author.
    pub user: User,
}

/// A comment on an issue or PR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Comment {
    /// The comment text.
    #[serde(deserialize_with = "null_as_empty")]
    pub body: String,
    /// The comment author.
    pub user: User,
}

/// The previous value of an edited field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PreviousValue {
    /// The value before the edit.
    pub from: String,
}

/// The fields changed by an `edited` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Changes {
    /// The previous comment text.
    pub body: Option<PreviousValue>,
}

/// An `issue_comment` webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IssueCommentEvent {
    /// What happened to the comment.
    pub action: String,
    /// The issue or PR commented on.
    pub issue: Issue,
    /// The comment.
    pub comment: Comment,
    /// What changed, on `edited` actions.
    pub changes: Option<Changes>,
    /// The repository.
    pub repository: Repository,
    /// The account that triggered the event.
    pub sender: User,
}

impl IssueCommentEvent {
    /// Returns the comment text before the edit, or an empty string.
    pub fn previous_body(&self) -> &str {
        self.changes
            .as_ref()
            .and_then(|c| c.body.as_ref())
            .map(|b| b.from.as_str())
            .unwrap_or_default()
    }
}

/// Deserializes an explicit `null` string as empty.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// An inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A pull request changed.
    PullRequest(Box<PullRequestEvent>),
    /// An issue or PR comment changed.
    IssueComment(Box<IssueCommentEvent>),
    /// Any other event type, carried by name only.
    Unhandled(String),
}

impl Event {
    /// Parses a webhook payload according to its event type header.
    ///
    /// ## Takes
    /// - `event_type` - The value of the event type header.
    /// - `payload` - The raw JSON body.
    ///
    /// ## Returns
    /// - `Ok(event)` - The parsed event. Unknown event types are [Event::Unhandled] and never fail.
    /// - `Err(PromoterError::Payload)` - A known event type carried a malformed body.
    pub fn parse(event_type: &str, payload: &[u8]) -> PromoterResult<Self> {
        let payload_error = |source| PromoterError::Payload {
            event_type: event_type.to_string(),
            source,
        };

        match event_type {
            "pull_request" => serde_json::from_slice(payload)
                .map(|e| Self::PullRequest(Box::new(e)))
                .map_err(payload_error),
            "issue_comment" => serde_json::from_slice(payload)
                .map(|e| Self::IssueComment(Box::new(e)))
                .map_err(payload_error),
            other => Ok(Self::Unhandled(other.to_string())),
        }
    }

    /// The short name used in logs.
    pub fn kind(&self) -> &str {
        match self {
            Self::PullRequest(_) => "pr",
            Self::IssueComment(_) => "issue_comment",
            Self::Unhandled(name) => name,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Event;
    use crate::errors::PromoterError;

    const MERGED_PR: &str = r#"{
        "action": "closed",
        "number": 12,
        "pull_request": {
            "number": 12,
            "merged": true,
            "body": null,
            "user": {"login": "alice"},
            "head": {"ref": "feature/x", "sha": "abc123"},
            "labels": [{"name": "ready"}]
        },
        "repository": {"name": "gitops", "owner": {"login": "acme"}, "html_url": "https://github.com/acme/gitops"}
    }"#;

    #[test]
    fn parses_pull_request_event() {
        let Event::PullRequest(event) = Event::parse("pull_request", MERGED_PR.as_bytes()).unwrap() else {
            panic!("expected a pull request event");
        };
        assert_eq!(event.action, "closed");
        assert!(event.pull_request.merged);
        assert_eq!(event.pull_request.body, "");
        assert_eq!(event.pull_request.head.git_ref, "feature/x");
        assert_eq!(event.pull_request.labels[0].name, "ready");
        assert_eq!(event.repository.owner.login, "acme");
    }

    #[test]
    fn parses_edited_comment() {
        let payload = r#"{
            "action": "edited",
            "issue": {"number": 4, "state": "open", "body": "desc", "user": {"login": "alice"}},
            "comment": {"body": "- [x] new", "user": {"login": "promoter-bot[bot]"}},
            "changes": {"body": {"from": "- [ ] old"}},
            "repository": {"name": "gitops", "owner": {"login": "acme"}, "html_url": "https://github.com/acme/gitops"},
            "sender": {"login": "bob"}
        }"#;
        let Event::IssueComment(event) = Event::parse("issue_comment", payload.as_bytes()).unwrap() else {
            panic!("expected an issue comment event");
        };
        assert_eq!(event.previous_body(), "- [ ] old");
        assert_eq!(event.sender.login, "bob");
    }

    #[test]
    fn unknown_types_are_unhandled() {
        assert_eq!(
            Event::parse("push", b"not even json").unwrap(),
            Event::Unhandled("push".to_string())
        );
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(matches!(
            Event::parse("pull_request", b"{"),
            Err(PromoterError::Payload { .. })
        ));
    }
}
