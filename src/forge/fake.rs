//! An in-memory [Forge] for tests.

use super::{
    ContentEntry, EntryKind, Forge, ForgeError, ForgeResult, NewPullRequest, PullRequestRef,
    PullRequestSummary,
};
use crate::{status::CommitStatus, sync::TreeMutation};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
};

/// A mutating call recorded by [FakeForge].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    CreateTree {
        base: String,
        mutations: Vec<TreeMutation>,
    },
    CreateCommit {
        message: String,
        tree: String,
        parent: String,
    },
    CreateRef {
        ref_name: String,
        sha: String,
    },
    CreatePullRequest(NewPullRequest),
    AddLabels {
        number: u64,
        labels: Vec<String>,
    },
    AddAssignees {
        number: u64,
        assignees: Vec<String>,
    },
    Comment {
        number: u64,
        body: String,
    },
    Approve(u64),
    Merge(u64),
    Status {
        sha: String,
        status: CommitStatus,
    },
}

/// A repository backed by a path to content map.
///
/// Directories exist implicitly when a file lives under them, and have the identity `tree:<path>`.
pub(crate) struct FakeForge {
    files: Mutex<BTreeMap<String, String>>,
    links: Mutex<BTreeSet<String>>,
    failing_listings: Mutex<BTreeSet<String>>,
    merge_failures: Mutex<VecDeque<ForgeError>>,
    merge_attempts: AtomicU64,
    fail_assignees: AtomicBool,
    fail_pull_request: AtomicBool,
    fail_bot_login: AtomicBool,
    fail_comments: AtomicBool,
    calls: Mutex<Vec<Call>>,
    pull_request: Mutex<PullRequestSummary>,
    pull_request_files: Mutex<Vec<String>>,
    statuses: Mutex<Vec<CommitStatus>>,
    next_pr: AtomicU64,
    bot: String,
}

impl Default for FakeForge {
    fn default() -> Self {
        Self {
            files: Default::default(),
            links: Default::default(),
            failing_listings: Default::default(),
            merge_failures: Default::default(),
            merge_attempts: AtomicU64::new(0),
            fail_assignees: AtomicBool::new(false),
            fail_pull_request: AtomicBool::new(false),
            fail_bot_login: AtomicBool::new(false),
            fail_comments: AtomicBool::new(false),
            calls: Default::default(),
            pull_request: Default::default(),
            pull_request_files: Default::default(),
            statuses: Default::default(),
            next_pr: AtomicU64::new(100),
            bot: "promoter-bot[bot]".to_string(),
        }
    }
}

impl FakeForge {
    pub(crate) fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let forge = Self::default();
        forge.add_files(files);
        forge
    }

    pub(crate) fn add_files<'a>(&self, files: impl IntoIterator<Item = (&'a str, &'a str)>) {
        let mut map = self.files.lock().unwrap();
        for (path, content) in files {
            map.insert(path.to_string(), content.to_string());
        }
    }

    /// Seeds entries that are neither files nor directories, such as symlinks and submodules.
    pub(crate) fn add_links<'a>(&self, paths: impl IntoIterator<Item = &'a str>) {
        self.links.lock().unwrap().extend(paths.into_iter().map(str::to_string));
    }

    pub(crate) fn dir_sha(path: &str) -> String {
        format!("tree:{path}")
    }

    pub(crate) fn bot(&self) -> &str {
        &self.bot
    }

    pub(crate) fn fail_listing(&self, path: &str) {
        self.failing_listings.lock().unwrap().insert(path.to_string());
    }

    pub(crate) fn fail_assignees(&self) {
        self.fail_assignees.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_pull_request(&self) {
        self.fail_pull_request.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_bot_login(&self) {
        self.fail_bot_login.store(true, Ordering::SeqCst);
    }

    /// Makes every comment fail.
    pub(crate) fn fail_comments(&self) {
        self.fail_comments.store(true, Ordering::SeqCst);
    }

    fn lookup(flag: &AtomicBool) -> ForgeResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(ForgeError::Transport("connection reset".to_string()));
        }
        Ok(())
    }

    pub(crate) fn script_merge_failures(&self, errors: impl IntoIterator<Item = ForgeError>) {
        self.merge_failures.lock().unwrap().extend(errors);
    }

    pub(crate) fn set_pull_request(&self, pr: PullRequestSummary) {
        *self.pull_request.lock().unwrap() = pr;
    }

    pub(crate) fn set_pull_request_files<'a>(&self, files: impl IntoIterator<Item = &'a str>) {
        *self.pull_request_files.lock().unwrap() = files.into_iter().map(str::to_string).collect();
    }

    pub(crate) fn set_statuses(&self, statuses: Vec<CommitStatus>) {
        *self.statuses.lock().unwrap() = statuses;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn merge_attempts(&self) -> u64 {
        self.merge_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn merged(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Merge(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn comments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Comment { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn opened(&self) -> Vec<NewPullRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreatePullRequest(pr) => Some(pr),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn trees(&self) -> Vec<Vec<TreeMutation>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateTree { mutations, .. } => Some(mutations),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn statuses_set(&self) -> Vec<CommitStatus> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Status { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Forge for FakeForge {
    async fn default_branch(&self) -> ForgeResult<String> {
        Ok("main".to_string())
    }

    async fn get_file(&self, path: &str, _git_ref: &str) -> ForgeResult<Option<String>> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    async fn list_dir(&self, path: &str, _git_ref: &str) -> ForgeResult<Option<Vec<ContentEntry>>> {
        if self.failing_listings.lock().unwrap().contains(path) {
            return Err(ForgeError::Api {
                status: 500,
                message: format!("listing of {path} failed"),
            });
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let files = self.files.lock().unwrap().keys().map(|f| (f.clone(), EntryKind::File)).collect::<Vec<_>>();
        let links = self.links.lock().unwrap().iter().map(|l| (l.clone(), EntryKind::Other)).collect::<Vec<_>>();

        let mut children = BTreeMap::new();
        for (file, kind) in files.into_iter().chain(links) {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            let entry = match rest.split_once('/') {
                Some((dir, _)) => {
                    let dir = format!("{prefix}{dir}");
                    ContentEntry {
                        sha: Self::dir_sha(&dir),
                        path: dir,
                        kind: EntryKind::Dir,
                    }
                }
                None => ContentEntry {
                    sha: format!("blob:{file}"),
                    path: file,
                    kind,
                },
            };
            children.insert(entry.path.clone(), entry);
        }

        if children.is_empty() && !path.is_empty() {
            return Ok(None);
        }
        Ok(Some(children.into_values().collect()))
    }

    async fn pull_request(&self, _number: u64) -> ForgeResult<PullRequestSummary> {
        Self::lookup(&self.fail_pull_request)?;
        Ok(self.pull_request.lock().unwrap().clone())
    }

    async fn pull_request_files(&self, _number: u64) -> ForgeResult<Vec<String>> {
        Ok(self.pull_request_files.lock().unwrap().clone())
    }

    async fn branch_head(&self, branch: &str) -> ForgeResult<String> {
        Ok(format!("head:{branch}"))
    }

    async fn create_tree(&self, base_tree: &str, mutations: &[TreeMutation]) -> ForgeResult<String> {
        self.record(Call::CreateTree {
            base: base_tree.to_string(),
            mutations: mutations.to_vec(),
        });
        Ok(format!("newtree:{base_tree}"))
    }

    async fn create_commit(&self, message: &str, tree: &str, parent: &str) -> ForgeResult<String> {
        self.record(Call::CreateCommit {
            message: message.to_string(),
            tree: tree.to_string(),
            parent: parent.to_string(),
        });
        Ok(format!("commit:{tree}"))
    }

    async fn create_ref(&self, ref_name: &str, sha: &str) -> ForgeResult<()> {
        self.record(Call::CreateRef {
            ref_name: ref_name.to_string(),
            sha: sha.to_string(),
        });
        Ok(())
    }

    async fn create_pull_request(&self, pr: &NewPullRequest) -> ForgeResult<PullRequestRef> {
        self.record(Call::CreatePullRequest(pr.clone()));
        let number = self.next_pr.fetch_add(1, Ordering::SeqCst);
        Ok(PullRequestRef {
            number,
            html_url: format!("https://github.com/acme/gitops/pull/{number}"),
        })
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> ForgeResult<()> {
        self.record(Call::AddLabels {
            number,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> ForgeResult<()> {
        if self.fail_assignees.load(Ordering::SeqCst) {
            return Err(ForgeError::Api {
                status: 422,
                message: "Validation Failed".to_string(),
            });
        }
        self.record(Call::AddAssignees {
            number,
            assignees: assignees.to_vec(),
        });
        Ok(())
    }

    async fn create_comment(&self, number: u64, body: &str) -> ForgeResult<()> {
        Self::lookup(&self.fail_comments)?;
        self.record(Call::Comment {
            number,
            body: body.to_string(),
        });
        Ok(())
    }

    async fn approve_pull_request(&self, number: u64) -> ForgeResult<()> {
        self.record(Call::Approve(number));
        Ok(())
    }

    async fn merge_pull_request(&self, number: u64) -> ForgeResult<()> {
        self.merge_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.merge_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.record(Call::Merge(number));
        Ok(())
    }

    async fn list_statuses(&self, _git_ref: &str) -> ForgeResult<Vec<CommitStatus>> {
        Ok(self.statuses.lock().unwrap().clone())
    }

    async fn create_status(&self, sha: &str, status: &CommitStatus) -> ForgeResult<()> {
        self.record(Call::Status {
            sha: sha.to_string(),
            status: status.clone(),
        });
        Ok(())
    }

    async fn bot_login(&self) -> ForgeResult<String> {
        Self::lookup(&self.fail_bot_login)?;
        Ok(self.bot.clone())
    }
}
