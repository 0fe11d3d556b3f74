//! Configuration of the `promoter` service and of the repositories it manages.

use crate::{
    constants::{COMPONENT_CONFIG_FILE_NAME, DEFAULT_CLIENT_CACHE_SIZE, REPO_CONFIG_FILE_NAME},
    errors::{PromoterError, PromoterResult},
    forge::{Credentials, Forge},
};
use clap::Args;
use regex::Regex;
use serde::Deserialize;
use std::{collections::BTreeMap, path::PathBuf};
use tracing::debug;

/// GitHub connection settings shared by every subcommand.
#[derive(Debug, Clone, Default, Eq, PartialEq, Args)]
pub struct GitHubArgs {
    /// Token of the main identity.
    #[arg(long, env = "GITHUB_OAUTH_TOKEN", hide_env_values = true)]
    pub github_oauth_token: Option<String>,
    /// GitHub App ID of the main identity.
    #[arg(long, env = "GITHUB_APP_ID")]
    pub github_app_id: Option<u64>,
    /// Private key of the main identity's GitHub App.
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY_PATH")]
    pub github_app_private_key_path: Option<PathBuf>,
    /// Token of the identity that approves promotion PRs.
    #[arg(long, env = "APPROVER_GITHUB_OAUTH_TOKEN", hide_env_values = true)]
    pub approver_github_oauth_token: Option<String>,
    /// GitHub App ID of the approver identity.
    #[arg(long, env = "APPROVER_GITHUB_APP_ID")]
    pub approver_github_app_id: Option<u64>,
    /// Private key of the approver identity's GitHub App.
    #[arg(long, env = "APPROVER_GITHUB_APP_PRIVATE_KEY_PATH")]
    pub approver_github_app_private_key_path: Option<PathBuf>,
    /// GitHub Enterprise host. Unset for github.com.
    #[arg(long, env = "GITHUB_HOST")]
    pub github_host: Option<String>,
    /// Template file for the target URL of the bot's commit status.
    #[arg(long, env = "CUSTOM_COMMIT_STATUS_URL_TEMPLATE_PATH")]
    pub commit_status_url_template: Option<PathBuf>,
    /// Maximum number of cached clients per identity.
    #[arg(long, env = "CLIENT_CACHE_SIZE", default_value_t = DEFAULT_CLIENT_CACHE_SIZE)]
    pub client_cache_size: u64,
}

impl GitHubArgs {
    /// Credentials of the main identity.
    pub fn main_credentials(&self) -> Option<Credentials> {
        Credentials::resolve(
            self.github_app_id,
            self.github_app_private_key_path.clone(),
            self.github_oauth_token.clone(),
        )
    }

    /// Credentials of the approver identity.
    pub fn approver_credentials(&self) -> Option<Credentials> {
        Credentials::resolve(
            self.approver_github_app_id,
            self.approver_github_app_private_key_path.clone(),
            self.approver_github_oauth_token.clone(),
        )
    }

    /// Settings consumed while handling events.
    pub fn settings(&self) -> Settings {
        Settings {
            commit_status_url_template: self.commit_status_url_template.clone(),
        }
    }
}

/// Process-wide settings consumed while handling events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Template file for the target URL of the bot's commit status.
    pub commit_status_url_template: Option<PathBuf>,
}

/// The in-repo configuration, read from the default branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Post the promotion plan as a comment instead of opening promotion PRs.
    pub dry_run_mode: bool,
    /// Approve promotion PRs with the approver identity.
    pub auto_approve_promotion_prs: bool,
    /// Where changes under a source path get promoted to.
    pub promotion_paths: Vec<PromotionPath>,
    /// Delivery controller integration.
    pub delivery: DeliveryConfig,
    /// Comment keyword to commit status context, toggled by `/<keyword>` comments.
    pub toggle_commit_status: BTreeMap<String, String>,
}

/// A source path and the promotions its changes trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PromotionPath {
    /// The directory changes are promoted from.
    pub source_path: String,
    /// Number of extra path segments below the source path that make up a component name.
    pub component_path_extra_depth: usize,
    /// When promotions from this path apply.
    pub conditions: Conditions,
    /// One promotion PR per entry.
    pub promotion_prs: Vec<PromotionPr>,
}

/// Conditions on a [PromotionPath].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Conditions {
    /// Every label listed here must be present on the triggering PR.
    pub pr_has_labels: Vec<String>,
    /// Merge the promotion PRs as soon as they are opened.
    pub auto_merge: bool,
}

/// The targets of one promotion PR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PromotionPr {
    /// The directories the source gets copied onto.
    pub target_paths: Vec<String>,
    /// Human description of the targets, used in the PR title.
    pub target_description: Option<String>,
}

/// Delivery controller integration settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Comment the diff of affected applications on changed PRs.
    pub comment_diff_on_pr: bool,
    /// Merge promotion PRs whose diff is empty.
    pub auto_merge_no_diff_prs: bool,
    /// Component paths whose applications may be synced from a PR branch. Empty disables branch syncing.
    pub allow_sync_from_branch_path_regex: String,
    /// Discover applications by a commit SHA label instead of by path.
    pub use_sha_label_for_app_discovery: bool,
    /// Create a temporary application to preview components that have none yet.
    pub create_temp_app_for_new_apps: bool,
}

impl DeliveryConfig {
    /// Compiles the branch sync pattern.
    ///
    /// ## Returns
    /// - `Ok(None)` - Branch syncing is disabled.
    /// - `Ok(Some(regex))` - The compiled pattern.
    /// - `Err(_)` - The pattern does not compile.
    pub fn branch_sync_pattern(&self) -> PromoterResult<Option<Regex>> {
        let pattern = &self.allow_sync_from_branch_path_regex;
        if pattern.is_empty() {
            return Ok(None);
        }
        Regex::new(pattern)
            .map(Some)
            .map_err(|source| PromoterError::InvalidRegex {
                pattern: pattern.clone(),
                source,
            })
    }
}

impl RepoConfig {
    /// Parses the in-repo configuration.
    pub fn parse(raw: &str) -> PromoterResult<Self> {
        toml::from_str(raw).map_err(|source| PromoterError::Config {
            path: REPO_CONFIG_FILE_NAME.to_string(),
            source,
        })
    }

    /// Loads the in-repo configuration at `git_ref`. A missing file yields the default configuration.
    pub async fn load(forge: &dyn Forge, git_ref: &str) -> PromoterResult<Self> {
        match forge.get_file(REPO_CONFIG_FILE_NAME, git_ref).await? {
            Some(raw) => Self::parse(&raw),
            None => {
                debug!(git_ref, "No in-repo configuration, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Configuration that lives inside a component directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Do not compute a diff for this component.
    pub disable_diff: bool,
    /// If non-empty, only target component paths matching one of these patterns are promoted to.
    pub promotion_target_allow_list: Vec<String>,
    /// Target component paths matching one of these patterns are never promoted to.
    pub promotion_target_block_list: Vec<String>,
}

impl ComponentConfig {
    /// Loads the configuration of the component at `component_path`, at `git_ref`.
    pub async fn load(forge: &dyn Forge, component_path: &str, git_ref: &str) -> PromoterResult<Self> {
        let path = format!(
            "{}/{}",
            component_path.trim_end_matches('/'),
            COMPONENT_CONFIG_FILE_NAME
        );
        match forge.get_file(&path, git_ref).await? {
            Some(raw) => toml::from_str(&raw).map_err(|source| PromoterError::Config { path, source }),
            None => Ok(Self::default()),
        }
    }

    /// Returns `true` if promoting to `target_component_path` is allowed.
    pub fn allows_target(&self, target_component_path: &str) -> PromoterResult<bool> {
        let matches_any = |patterns: &[String]| -> PromoterResult<bool> {
            for pattern in patterns {
                let re = Regex::new(pattern).map_err(|source| PromoterError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })?;
                if re.is_match(target_component_path) {
                    return Ok(true);
                }
            }
            Ok(false)
        };

        if !self.promotion_target_allow_list.is_empty()
            && !matches_any(&self.promotion_target_allow_list)?
        {
            return Ok(false);
        }
        Ok(!matches_any(&self.promotion_target_block_list)?)
    }
}

#[cfg(test)]
mod test {
    use super::{ComponentConfig, RepoConfig};
    use crate::forge::fake::FakeForge;

    const CONFIG: &str = r#"
dry_run_mode = true

[[promotion_paths]]
source_path = "env/staging/"
[promotion_paths.conditions]
pr_has_labels = ["ready"]
auto_merge = true
[[promotion_paths.promotion_prs]]
target_paths = ["env/prod/us-east/", "env/prod/eu-west/"]
target_description = "prod"

[delivery]
comment_diff_on_pr = true
allow_sync_from_branch_path_regex = "^env/staging/.*$"

[toggle_commit_status]
"override-terraform" = "terraform-ci"
"#;

    #[test]
    fn parses_full_config() {
        let config = RepoConfig::parse(CONFIG).unwrap();

        assert!(config.dry_run_mode);
        assert!(!config.auto_approve_promotion_prs);
        assert_eq!(config.promotion_paths.len(), 1);

        let path = &config.promotion_paths[0];
        assert_eq!(path.source_path, "env/staging/");
        assert_eq!(path.component_path_extra_depth, 0);
        assert_eq!(path.conditions.pr_has_labels, vec!["ready"]);
        assert!(path.conditions.auto_merge);
        assert_eq!(path.promotion_prs[0].target_paths.len(), 2);
        assert_eq!(path.promotion_prs[0].target_description.as_deref(), Some("prod"));

        assert!(config.delivery.comment_diff_on_pr);
        assert!(config
            .delivery
            .branch_sync_pattern()
            .unwrap()
            .unwrap()
            .is_match("env/staging/app"));
        assert_eq!(
            config.toggle_commit_status.get("override-terraform").map(String::as_str),
            Some("terraform-ci")
        );
    }

    #[test]
    fn empty_branch_sync_pattern_disables() {
        let config = RepoConfig::parse("").unwrap();
        assert_eq!(config, RepoConfig::default());
        assert!(config.delivery.branch_sync_pattern().unwrap().is_none());
    }

    #[test]
    fn invalid_config_is_an_error() {
        assert!(RepoConfig::parse("dry_run_mode = \"maybe\"").is_err());
    }

    #[tokio::test]
    async fn missing_config_yields_defaults() {
        let forge = FakeForge::default();
        assert_eq!(RepoConfig::load(&forge, "main").await.unwrap(), RepoConfig::default());
    }

    #[tokio::test]
    async fn component_config_filters_targets() {
        let forge = FakeForge::with_files([(
            "env/staging/app/promoter-component.toml",
            "promotion_target_allow_list = [\"^env/prod/\"]\npromotion_target_block_list = [\"eu-west\"]\n",
        )]);

        let config = ComponentConfig::load(&forge, "env/staging/app/", "main").await.unwrap();

        assert!(config.allows_target("env/prod/us-east/app").unwrap());
        assert!(!config.allows_target("env/prod/eu-west/app").unwrap());
        assert!(!config.allows_target("env/qa/app").unwrap());
        assert!(ComponentConfig::default().allows_target("anything").unwrap());
    }
}
