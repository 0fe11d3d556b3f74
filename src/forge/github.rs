//! [Forge] implementation over the GitHub REST and GraphQL APIs.

use super::{
    ContentEntry, EntryKind, Forge, ForgeError, ForgeResult, NewPullRequest, PullRequestRef,
    PullRequestSummary,
};
use crate::{status::CommitStatus, sync::TreeMutation};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use octocrab::Octocrab;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

/// Page size used for paginated listings.
const PAGE_SIZE: usize = 100;

/// A repository on GitHub, reached through an authenticated [Octocrab] client.
#[derive(Debug, Clone)]
pub struct GitHubForge {
    client: Octocrab,
    owner: String,
    repo: String,
}

impl GitHubForge {
    /// Creates a handle on `owner/repo`.
    pub fn new(client: Octocrab, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            client,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Returns the REST route of `path` within the repository.
    fn route(&self, path: &str) -> String {
        format!("/repos/{}/{}{}", self.owner, self.repo, path)
    }

    async fn get<R: DeserializeOwned + Send, P: Serialize + Sync + ?Sized>(
        &self,
        route: String,
        params: Option<&P>,
    ) -> ForgeResult<R> {
        self.client.get(route, params).await.map_err(to_forge_error)
    }

    async fn post<R: DeserializeOwned + Send, B: Serialize + Sync + ?Sized>(
        &self,
        route: String,
        body: &B,
    ) -> ForgeResult<R> {
        self.client.post(route, Some(body)).await.map_err(to_forge_error)
    }
}

/// Converts an [octocrab::Error] into a [ForgeError], keeping the HTTP status of API errors.
fn to_forge_error(err: octocrab::Error) -> ForgeError {
    match err {
        octocrab::Error::GitHub { source, .. } => ForgeError::Api {
            status: source.status_code.as_u16(),
            message: source.message,
        },
        octocrab::Error::Serde { source, .. } => ForgeError::Decode(source.to_string()),
        octocrab::Error::Json { source, .. } => ForgeError::Decode(source.to_string()),
        other => ForgeError::Transport(other.to_string()),
    }
}

/// Maps a 404 to [None].
fn found<T>(result: ForgeResult<T>) -> ForgeResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Serializes a [TreeMutation] as an entry of the create-tree request.
fn tree_entry(mutation: &TreeMutation) -> Value {
    match mutation {
        TreeMutation::ReplaceDir { path, sha } => json!({
            "path": path,
            "mode": "040000",
            "type": "tree",
            "sha": sha,
        }),
        // A null sha removes the file.
        TreeMutation::DeleteFile { path } => json!({
            "path": path,
            "mode": "100644",
            "type": "blob",
            "sha": Value::Null,
        }),
        TreeMutation::WriteFile { path, content } => json!({
            "path": path,
            "mode": "100644",
            "type": "blob",
            "content": content,
        }),
    }
}

#[derive(Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: Sha,
}

#[derive(Deserialize)]
struct ContentItem {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
struct Head {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Deserialize)]
struct PullRequest {
    number: u64,
    html_url: String,
    head: Head,
}

#[derive(Deserialize)]
struct PullRequestFile {
    filename: String,
}

#[derive(Deserialize)]
struct Repository {
    default_branch: String,
}

#[derive(Deserialize)]
struct ViewerData {
    data: Viewer,
}

#[derive(Deserialize)]
struct Viewer {
    viewer: Login,
}

#[derive(Serialize)]
struct RefParam<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

#[derive(Serialize)]
struct PageParams {
    per_page: usize,
    page: usize,
}

#[async_trait]
impl Forge for GitHubForge {
    async fn default_branch(&self) -> ForgeResult<String> {
        let repo: Repository = self.get(self.route(""), None::<&()>).await?;
        Ok(repo.default_branch)
    }

    async fn get_file(&self, path: &str, git_ref: &str) -> ForgeResult<Option<String>> {
        let params = RefParam { git_ref };
        let item = found(
            self.get::<ContentItem, _>(self.route(&format!("/contents/{path}")), Some(&params))
                .await,
        )?;
        let Some(item) = item else {
            return Ok(None);
        };

        // The content is base64 with embedded line breaks.
        let encoded = item
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| ForgeError::Decode(format!("{path}: {e}")))?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| ForgeError::Decode(format!("{path}: {e}")))
    }

    async fn list_dir(&self, path: &str, git_ref: &str) -> ForgeResult<Option<Vec<ContentEntry>>> {
        let params = RefParam { git_ref };
        let listing = found(
            self.get::<Value, _>(self.route(&format!("/contents/{path}")), Some(&params))
                .await,
        )?;
        let Some(listing) = listing else {
            return Ok(None);
        };

        // A file path answers with a single object rather than a listing.
        if !listing.is_array() {
            return Ok(None);
        }

        let items: Vec<ContentItem> =
            serde_json::from_value(listing).map_err(|e| ForgeError::Decode(e.to_string()))?;
        Ok(Some(
            items
                .into_iter()
                .map(|item| ContentEntry {
                    kind: match item.kind.as_str() {
                        "file" => EntryKind::File,
                        "dir" => EntryKind::Dir,
                        _ => EntryKind::Other,
                    },
                    path: item.path,
                    sha: item.sha,
                })
                .collect(),
        ))
    }

    async fn pull_request(&self, number: u64) -> ForgeResult<PullRequestSummary> {
        let pr: PullRequest = self.get(self.route(&format!("/pulls/{number}")), None::<&()>).await?;
        Ok(PullRequestSummary {
            head_ref: pr.head.git_ref,
            head_sha: pr.head.sha,
        })
    }

    async fn pull_request_files(&self, number: u64) -> ForgeResult<Vec<String>> {
        let mut files = Vec::new();
        for page in 1.. {
            let params = PageParams {
                per_page: PAGE_SIZE,
                page,
            };
            let batch: Vec<PullRequestFile> = self
                .get(self.route(&format!("/pulls/{number}/files")), Some(&params))
                .await?;
            let done = batch.len() < PAGE_SIZE;
            files.extend(batch.into_iter().map(|f| f.filename));
            if done {
                break;
            }
        }
        Ok(files)
    }

    async fn branch_head(&self, branch: &str) -> ForgeResult<String> {
        let git_ref: GitRef = self
            .get(self.route(&format!("/git/ref/heads/{branch}")), None::<&()>)
            .await?;
        Ok(git_ref.object.sha)
    }

    async fn create_tree(&self, base_tree: &str, mutations: &[TreeMutation]) -> ForgeResult<String> {
        let body = json!({
            "base_tree": base_tree,
            "tree": mutations.iter().map(tree_entry).collect::<Vec<_>>(),
        });
        let tree: Sha = self.post(self.route("/git/trees"), &body).await?;
        Ok(tree.sha)
    }

    async fn create_commit(&self, message: &str, tree: &str, parent: &str) -> ForgeResult<String> {
        let body = json!({ "message": message, "tree": tree, "parents": [parent] });
        let commit: Sha = self.post(self.route("/git/commits"), &body).await?;
        Ok(commit.sha)
    }

    async fn create_ref(&self, ref_name: &str, sha: &str) -> ForgeResult<()> {
        let body = json!({ "ref": ref_name, "sha": sha });
        self.post::<Value, _>(self.route("/git/refs"), &body).await?;
        Ok(())
    }

    async fn create_pull_request(&self, pr: &NewPullRequest) -> ForgeResult<PullRequestRef> {
        let body = json!({ "title": pr.title, "body": pr.body, "head": pr.head, "base": pr.base });
        let created: PullRequest = self.post(self.route("/pulls"), &body).await?;
        Ok(PullRequestRef {
            number: created.number,
            html_url: created.html_url,
        })
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> ForgeResult<()> {
        let body = json!({ "labels": labels });
        self.post::<Value, _>(self.route(&format!("/issues/{number}/labels")), &body)
            .await?;
        Ok(())
    }

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> ForgeResult<()> {
        let body = json!({ "assignees": assignees });
        self.post::<Value, _>(self.route(&format!("/issues/{number}/assignees")), &body)
            .await?;
        Ok(())
    }

    async fn create_comment(&self, number: u64, body: &str) -> ForgeResult<()> {
        let body = json!({ "body": body });
        self.post::<Value, _>(self.route(&format!("/issues/{number}/comments")), &body)
            .await?;
        Ok(())
    }

    async fn approve_pull_request(&self, number: u64) -> ForgeResult<()> {
        let body = json!({ "event": "APPROVE" });
        self.post::<Value, _>(self.route(&format!("/pulls/{number}/reviews")), &body)
            .await?;
        Ok(())
    }

    async fn merge_pull_request(&self, number: u64) -> ForgeResult<()> {
        let _merged: Value = self
            .client
            .put(self.route(&format!("/pulls/{number}/merge")), Some(&json!({})))
            .await
            .map_err(to_forge_error)?;
        Ok(())
    }

    async fn list_statuses(&self, git_ref: &str) -> ForgeResult<Vec<CommitStatus>> {
        self.get(self.route(&format!("/commits/{git_ref}/statuses")), None::<&()>)
            .await
    }

    async fn create_status(&self, sha: &str, status: &CommitStatus) -> ForgeResult<()> {
        self.post::<Value, _>(self.route(&format!("/statuses/{sha}")), status)
            .await?;
        Ok(())
    }

    async fn bot_login(&self) -> ForgeResult<String> {
        let query = json!({ "query": "query { viewer { login } }" });
        let viewer: ViewerData = self.client.graphql(&query).await.map_err(to_forge_error)?;
        Ok(viewer.data.viewer.login)
    }
}
