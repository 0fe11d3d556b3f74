//! `bump-overwrite` subcommand.

use super::main_clients;
use crate::{
    bump::{bump_version_overwrite, BumpRequest},
    config::GitHubArgs,
    errors::{PromoterError, PromoterResult},
};
use anyhow::{Context, Result};
use clap::Args;
use nu_ansi_term::Color::Blue;
use std::path::PathBuf;

/// CLI arguments for the `bump-overwrite` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct BumpOverwriteArgs {
    #[command(flatten)]
    github: GitHubArgs,
    /// The repository to open the PR in, as `owner/repo`.
    #[arg(long)]
    target_repo: String,
    /// The path of the file to overwrite in the target repository.
    #[arg(long)]
    target_file: String,
    /// The local file holding the new content.
    #[arg(long)]
    file: PathBuf,
    /// The `owner/repo` whose pipeline triggered the bump.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    triggering_repo: String,
    /// The commit of the triggering repository.
    #[arg(long, env = "GITHUB_SHA")]
    triggering_sha: String,
    /// The login the PR is assigned to.
    #[arg(long, env = "GITHUB_ACTOR", default_value = "")]
    triggering_actor: String,
    /// Merge the PR right after opening it.
    #[arg(long)]
    auto_merge: bool,
}

impl BumpOverwriteArgs {
    /// Run the `bump-overwrite` subcommand.
    pub async fn run(self) -> Result<()> {
        let (owner, repo) = split_repo(&self.target_repo)?;
        let content = tokio::fs::read_to_string(&self.file)
            .await
            .with_context(|| format!("reading {}", self.file.display()))?;

        let forge = main_clients(&self.github)?.github_forge(owner, repo).await?;
        let request = BumpRequest {
            target_file: self.target_file,
            content,
            triggering_repo: self.triggering_repo,
            triggering_sha: self.triggering_sha,
            triggering_actor: self.triggering_actor,
            auto_merge: self.auto_merge,
        };
        let opened = bump_version_overwrite(&forge, &request).await?;

        println!("Opened version bump PR {}.", Blue.paint(opened.html_url));
        Ok(())
    }
}

/// Splits `owner/repo`.
fn split_repo(slug: &str) -> PromoterResult<(&str, &str)> {
    match slug.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => Ok((owner, repo)),
        _ => Err(PromoterError::InvalidArgument {
            name: "target-repo",
            reason: format!("expected `owner/repo`, got `{slug}`"),
        }),
    }
}
