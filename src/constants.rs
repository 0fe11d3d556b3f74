//! Constants for the `promoter` application.

use std::time::Duration;

/// Name of the in-repo configuration file, read from the root of the default branch.
pub(crate) const REPO_CONFIG_FILE_NAME: &str = "promoter.toml";

/// Name of the per-component configuration file, read from inside a component directory.
pub(crate) const COMPONENT_CONFIG_FILE_NAME: &str = "promoter-component.toml";

/// Hard ceiling on the size of a single GitHub comment body.
pub(crate) const GITHUB_COMMENT_MAX_SIZE: usize = 65536;

/// Hidden marker prepended to every comment posted by the bot.
pub(crate) const COMMENT_TAG: &str = "<!-- promoter_tag -->\n";

/// Marker token of the "sync from branch" checkbox in diff comments.
pub(crate) const BRANCH_SYNC_CHECKBOX_ID: &str = "promoter-branch-sync";

/// Sentinel that opens the embedded promotion metadata block in a PR description.
pub(crate) const METADATA_BLOCK_OPEN: &str = "<!--|Promoter data, do not delete|";

/// Sentinel that closes the embedded promotion metadata block in a PR description.
pub(crate) const METADATA_BLOCK_CLOSE: &str = "|-->";

/// Label added to every promotion PR.
pub(crate) const PROMOTION_LABEL: &str = "promotion";

/// Label that requests a promotion plan comment.
pub(crate) const SHOW_PLAN_LABEL: &str = "show-plan";

/// Label added to PRs that do not change any application state.
pub(crate) const NOOP_LABEL: &str = "noop";

/// Branch name prefix of promotion branches.
pub(crate) const PROMOTION_BRANCH_PREFIX: &str = "promotions/";

/// Maximum length of a generated branch name.
pub(crate) const MAX_BRANCH_NAME_LEN: usize = 250;

/// Maximum number of bytes of the origin branch kept in a promotion branch name.
pub(crate) const MAX_ORIGIN_BRANCH_LEN: usize = 200;

/// Number of hex characters of the target-path hash kept in a promotion branch name.
pub(crate) const BRANCH_HASH_SUFFIX_LEN: usize = 12;

/// Commit status context owned by the bot.
pub(crate) const COMMIT_STATUS_CONTEXT: &str = "promoter";

/// Commit status description.
pub(crate) const COMMIT_STATUS_DESCRIPTION: &str = "Promoter GitOps Bot";

/// Target URL of the commit status when no template is configured or it fails to render.
pub(crate) const DEFAULT_COMMIT_STATUS_URL: &str = "https://github.com/promoter-bot/promoter";

/// Upper bound on the handling of a single inbound event.
pub(crate) const EVENT_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Upper bound on a single commit status update, independent of [EVENT_DEADLINE].
pub(crate) const STATUS_UPDATE_DEADLINE: Duration = Duration::from_secs(60);

/// Default capacity of the per-owner client caches.
pub(crate) const DEFAULT_CLIENT_CACHE_SIZE: u64 = 128;

/// Tab used to indent promotion hops in PR descriptions.
pub(crate) const MARKDOWN_TAB: &str = "&nbsp;&nbsp;&nbsp;&nbsp;";
