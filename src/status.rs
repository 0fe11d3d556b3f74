//! Commit statuses and the rendering of their target URL.

use crate::{
    constants::{COMMIT_STATUS_CONTEXT, COMMIT_STATUS_DESCRIPTION, DEFAULT_COMMIT_STATUS_URL},
    errors::PromoterResult,
};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, path::Path};
use tracing::debug;

/// Matches a `{{ placeholder }}` in a target URL template.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static placeholder pattern is valid")
});

/// The state of a commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    /// Processing has started.
    Pending,
    /// Processing finished without error.
    Success,
    /// Processing finished with an error.
    Error,
    /// A check failed.
    Failure,
}

impl Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
            Self::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// A commit status, as read from and written to the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    /// The status state.
    pub state: CommitState,
    /// The link shown next to the status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    /// The human description of the status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The status context name.
    pub context: String,
}

impl CommitStatus {
    /// Creates the status the bot reports for its own processing of a PR event.
    pub fn promoter(state: CommitState, target_url: String) -> Self {
        Self {
            state,
            target_url: Some(target_url),
            description: Some(COMMIT_STATUS_DESCRIPTION.to_string()),
            context: COMMIT_STATUS_CONTEXT.to_string(),
        }
    }

    /// Returns this status with the opposite outcome, for the comment toggle.
    pub fn toggled(&self) -> Self {
        let state = match self.state {
            CommitState::Success => CommitState::Failure,
            _ => CommitState::Success,
        };
        Self {
            state,
            ..self.clone()
        }
    }
}

/// Resolves the target URL of the bot's commit status.
///
/// The template file may reference `{{commit_time_ms}}` (milliseconds since the epoch) and `{{commit_time}}`
/// (RFC 3339). A missing template, an unreadable file or an unknown placeholder all yield the default URL.
///
/// ## Takes
/// - `commit_time` - The time the status is being set at.
/// - `template` - The path of the optional template file.
///
/// ## Returns
/// - The rendered URL with surrounding whitespace trimmed, or the default URL.
pub async fn commit_status_target_url(commit_time: DateTime<Utc>, template: Option<&Path>) -> String {
    let Some(template) = template else {
        return DEFAULT_COMMIT_STATUS_URL.to_string();
    };

    let raw = match read_template(template).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %template.display(), error = %e, "Failed to read target URL template");
            return DEFAULT_COMMIT_STATUS_URL.to_string();
        }
    };

    // Substitute every placeholder, remembering the first one we do not know.
    let mut unknown = None;
    let rendered = PLACEHOLDER.replace_all(&raw, |caps: &Captures<'_>| match &caps[1] {
        "commit_time_ms" => commit_time.timestamp_millis().to_string(),
        "commit_time" => commit_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        other => {
            unknown.get_or_insert_with(|| other.to_string());
            String::new()
        }
    });

    if let Some(name) = unknown {
        debug!(placeholder = %name, "Failed to render target URL template");
        return DEFAULT_COMMIT_STATUS_URL.to_string();
    }

    rendered.trim().to_string()
}

async fn read_template(path: &Path) -> PromoterResult<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

#[cfg(test)]
mod test {
    use super::{commit_status_target_url, read_template, CommitState, CommitStatus};
    use crate::{constants::DEFAULT_COMMIT_STATUS_URL, errors::PromoterError};
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn template(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn default_url_without_template() {
        assert_eq!(commit_status_target_url(Utc::now(), None).await, DEFAULT_COMMIT_STATUS_URL);
    }

    #[tokio::test]
    async fn renders_template() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let file = template("  https://custom-url.com?time={{ commit_time_ms }}&at={{commit_time}}\n");

        let url = commit_status_target_url(now, Some(file.path())).await;
        assert_eq!(
            url,
            format!(
                "https://custom-url.com?time={}&at=2024-05-01T12:00:00Z",
                now.timestamp_millis()
            )
        );
    }

    #[tokio::test]
    async fn unknown_placeholder_falls_back() {
        let file = template("https://custom-url.com?x={{ .CommitTime.Foo }}&y={{nope}}");
        assert_eq!(
            commit_status_target_url(Utc::now(), Some(file.path())).await,
            DEFAULT_COMMIT_STATUS_URL
        );
    }

    #[tokio::test]
    async fn missing_template_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.tmpl");
        assert_eq!(
            commit_status_target_url(Utc::now(), Some(&path)).await,
            DEFAULT_COMMIT_STATUS_URL
        );
    }

    #[tokio::test]
    async fn unreadable_template_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_template(&dir.path().join("absent.tmpl")).await.unwrap_err();
        assert!(matches!(err, PromoterError::Io(_)));
    }

    #[test]
    fn toggle_flips_between_success_and_failure() {
        let status = CommitStatus {
            state: CommitState::Pending,
            target_url: None,
            description: None,
            context: "terraform-ci".to_string(),
        };
        assert_eq!(status.toggled().state, CommitState::Success);
        assert_eq!(status.toggled().toggled().state, CommitState::Failure);
        assert_eq!(status.toggled().context, "terraform-ci");
    }
}
