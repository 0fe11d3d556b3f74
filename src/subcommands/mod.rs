//! The subcommands for the `promoter` application.

use crate::{
    config::GitHubArgs,
    constants::DEFAULT_CLIENT_CACHE_SIZE,
    diff::DisconnectedController,
    dispatch::Dispatcher,
    forge::{ClientCache, ForgeProvider},
    promotion::ConfigPlanner,
};
use anyhow::{anyhow, Result};
use clap::Subcommand;
use std::sync::Arc;
use tracing::info;

mod bump;
pub use bump::BumpOverwriteArgs;

mod event;
pub use event::EventArgs;

mod serve;
pub use serve::ServeArgs;

#[derive(Debug, Clone, Eq, PartialEq, Subcommand)]
pub enum Subcommands {
    /// Serve the webhook endpoint.
    #[clap(alias = "s")]
    Serve(ServeArgs),
    /// Handle a single event payload read from a file, then exit.
    #[clap(alias = "e")]
    Event(EventArgs),
    /// Overwrite a file in a target repository through a pull request.
    BumpOverwrite(BumpOverwriteArgs),
}

impl Subcommands {
    /// Run the subcommand.
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Serve(args) => args.run().await,
            Self::Event(args) => args.run().await,
            Self::BumpOverwrite(args) => args.run().await,
        }
    }
}

/// Builds the client cache of the main identity.
pub(crate) fn main_clients(github: &GitHubArgs) -> Result<ClientCache> {
    let credentials = github
        .main_credentials()
        .ok_or_else(|| anyhow!("No GitHub credentials configured. Set a token or a GitHub App."))?;
    Ok(ClientCache::new(
        credentials,
        github.github_host.as_deref(),
        cache_size(github),
    ))
}

/// Builds the [Dispatcher] wired to GitHub.
pub(crate) fn github_dispatcher(github: &GitHubArgs) -> Result<Dispatcher> {
    let main: Arc<dyn ForgeProvider> = Arc::new(main_clients(github)?);
    let approver = github.approver_credentials().map(|credentials| {
        info!("Approver identity configured");
        Arc::new(ClientCache::new(
            credentials,
            github.github_host.as_deref(),
            cache_size(github),
        )) as Arc<dyn ForgeProvider>
    });

    Ok(Dispatcher::new(
        main,
        approver,
        Arc::new(ConfigPlanner),
        Arc::new(DisconnectedController),
        github.settings(),
    ))
}

fn cache_size(github: &GitHubArgs) -> u64 {
    match github.client_cache_size {
        0 => DEFAULT_CLIENT_CACHE_SIZE,
        size => size,
    }
}
