//! `serve` subcommand.

use super::github_dispatcher;
use crate::{
    config::GitHubArgs,
    server::{serve, AppState},
};
use anyhow::{anyhow, Result};
use clap::Args;
use std::net::SocketAddr;

/// CLI arguments for the `serve` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    github: GitHubArgs,
    /// Shared secret the webhook payloads are signed with.
    #[arg(long, env = "GITHUB_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: String,
    /// Address to listen on.
    #[arg(long, env = "PROMOTER_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

impl ServeArgs {
    /// Run the `serve` subcommand.
    pub async fn run(self) -> Result<()> {
        if self.webhook_secret.is_empty() {
            return Err(anyhow!("The webhook secret must not be empty."));
        }

        let dispatcher = github_dispatcher(&self.github)?;
        serve(self.listen, AppState::new(dispatcher, self.webhook_secret.as_bytes())).await
    }
}
