//! Per-account cache of authenticated GitHub clients.

use super::GitHubForge;
use crate::errors::{PromoterError, PromoterResult};
use anyhow::{anyhow, Context};
use jsonwebtoken::EncodingKey;
use moka::future::Cache;
use octocrab::{
    models::{AppId, Installation},
    Octocrab,
};
use std::path::PathBuf;
use tracing::{debug, info};

/// How a client authenticates against GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A GitHub App, exchanged for an installation token per account.
    App {
        /// The App ID.
        app_id: u64,
        /// The path of the App's PEM encoded private key.
        private_key_path: PathBuf,
    },
    /// A personal access or OAuth token.
    Token(String),
}

impl Credentials {
    /// Picks the credentials to use out of the configured ones. A GitHub App wins over a token when both are
    /// fully configured.
    ///
    /// ## Returns
    /// - `Some(credentials)` - The credentials to use.
    /// - `None` - Nothing usable is configured.
    pub fn resolve(
        app_id: Option<u64>,
        private_key_path: Option<PathBuf>,
        token: Option<String>,
    ) -> Option<Self> {
        match (app_id, private_key_path, token) {
            (Some(app_id), Some(private_key_path), _) => Some(Self::App {
                app_id,
                private_key_path,
            }),
            (_, _, Some(token)) if !token.is_empty() => Some(Self::Token(token)),
            _ => None,
        }
    }
}

/// Returns the REST base URI for `host`, or [None] for github.com.
pub(crate) fn api_base_uri(host: Option<&str>) -> Option<String> {
    host.filter(|h| !h.is_empty())
        .map(|h| format!("https://{}/api/v3", h.trim_end_matches('/')))
}

/// A bounded cache mapping an account login to its authenticated client.
///
/// Concurrent lookups of the same account share a single credential exchange.
#[derive(Clone)]
pub struct ClientCache {
    clients: Cache<String, Octocrab>,
    credentials: Credentials,
    base_uri: Option<String>,
}

impl ClientCache {
    /// Creates an empty cache holding at most `capacity` clients.
    pub fn new(credentials: Credentials, host: Option<&str>, capacity: u64) -> Self {
        Self {
            clients: Cache::new(capacity),
            credentials,
            base_uri: api_base_uri(host),
        }
    }

    /// Returns the client for `owner`, building and caching it if needed.
    pub async fn client_for(&self, owner: &str) -> PromoterResult<Octocrab> {
        self.clients
            .try_get_with(owner.to_string(), self.build(owner))
            .await
            .map_err(|e| PromoterError::ClientInit {
                owner: owner.to_string(),
                reason: format!("{e:#}"),
            })
    }

    /// Returns a [GitHubForge] for `owner/repo`.
    pub async fn github_forge(&self, owner: &str, repo: &str) -> PromoterResult<GitHubForge> {
        Ok(GitHubForge::new(self.client_for(owner).await?, owner, repo))
    }

    /// Builds a fresh client for `owner`.
    async fn build(&self, owner: &str) -> anyhow::Result<Octocrab> {
        let mut builder = Octocrab::builder();
        if let Some(base_uri) = &self.base_uri {
            builder = builder.base_uri(base_uri.as_str())?;
        }

        match &self.credentials {
            Credentials::Token(token) => {
                debug!(owner, "Building token client");
                Ok(builder.personal_token(token.clone()).build()?)
            }
            Credentials::App {
                app_id,
                private_key_path,
            } => {
                let pem = tokio::fs::read(private_key_path)
                    .await
                    .with_context(|| format!("reading {}", private_key_path.display()))?;
                let key = EncodingKey::from_rsa_pem(&pem).context("parsing App private key")?;
                let app = builder.app(AppId(*app_id), key).build()?;

                // Resolve the installation of the App on this account.
                let installation: Installation = app
                    .get(format!("/users/{owner}/installation"), None::<&()>)
                    .await
                    .map_err(|e| anyhow!("App {app_id} has no installation on `{owner}`: {e}"))?;
                let (client, _token) = app.installation_and_token(installation.id).await?;

                info!(owner, installation = %installation.id, "Built GitHub App installation client");
                Ok(client)
            }
        }
    }
}
