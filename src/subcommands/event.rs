//! `event` subcommand.

use super::github_dispatcher;
use crate::{config::GitHubArgs, events::Event};
use anyhow::{Context, Result};
use clap::Args;
use nu_ansi_term::Color::Blue;
use std::path::PathBuf;

/// CLI arguments for the `event` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct EventArgs {
    #[command(flatten)]
    github: GitHubArgs,
    /// The event type, as sent in the `X-GitHub-Event` header.
    #[arg(long = "type")]
    event_type: String,
    /// The file holding the JSON payload.
    #[arg(long)]
    file: PathBuf,
}

impl EventArgs {
    /// Run the `event` subcommand.
    pub async fn run(self) -> Result<()> {
        let payload = tokio::fs::read(&self.file)
            .await
            .with_context(|| format!("reading {}", self.file.display()))?;
        let event = Event::parse(&self.event_type, &payload)?;

        github_dispatcher(&self.github)?.supervise(event).await?;
        println!("Handled `{}` event from {}.", Blue.paint(&self.event_type), self.file.display());
        Ok(())
    }
}
