//! Structured, [Serialize] + [Deserialize] representation of a chain of promotion PRs.
//!
//! The only durable state of a promotion is the [ChainMetadata] embedded in the description of each promotion
//! PR. Each merge decodes it from the merged PR, extends it by one hop, and embeds it in the PRs it opens.

use crate::{
    constants::{METADATA_BLOCK_CLOSE, METADATA_BLOCK_OPEN},
    errors::PromoterResult,
    promotion::PromotionInstance,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

mod fmt;
pub use fmt::{promotion_pr_body, render_hops};

/// Matches the embedded metadata block and captures its payload.
static METADATA_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\|.*\|(.*)\|-->").expect("static metadata pattern is valid"));

/// The provenance of a promotion PR.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChainMetadata {
    /// Author of the first human-opened PR of the chain.
    #[serde(rename = "originalPrAuthor", default, deserialize_with = "null_as_default")]
    pub original_author: String,
    /// Number of the first human-opened PR of the chain. Older bots wrote `0` for unknown.
    #[serde(rename = "originalPrNumber", default, skip_serializing_if = "Option::is_none")]
    pub original_pr_number: Option<u64>,
    /// The target paths synchronized by this hop.
    #[serde(rename = "promotedPaths", default, deserialize_with = "null_as_default")]
    pub promoted_paths: BTreeSet<String>,
    /// Every ancestor promotion of the chain, keyed by the number of the PR that triggered it.
    #[serde(rename = "previousPromotionPaths", default, deserialize_with = "null_as_default")]
    pub prior_hops: BTreeMap<u64, PromotionHop>,
}

/// One link of a promotion chain.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PromotionHop {
    /// The directory the hop copied from.
    #[serde(rename = "sourcePath", default, deserialize_with = "null_as_default")]
    pub source_path: String,
    /// The directories the hop copied onto.
    #[serde(rename = "targetPaths", default, deserialize_with = "null_as_default")]
    pub target_paths: Vec<String>,
}

/// Deserializes an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChainMetadata {
    /// Extracts the metadata embedded in a PR description.
    ///
    /// Never fails: a missing block yields empty metadata, and a malformed one is logged and yields empty
    /// metadata too.
    pub fn decode(description: &str) -> Self {
        let Some(payload) = METADATA_BLOCK
            .captures(description)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|p| !p.is_empty())
        else {
            return Self::default();
        };

        let decoded = STANDARD
            .decode(payload)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice::<Self>(&bytes).map_err(|e| e.to_string()));
        match decoded {
            Ok(metadata) => {
                debug!(hops = metadata.prior_hops.len(), "Found PR metadata");
                metadata
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse PR metadata");
                Self::default()
            }
        }
    }

    /// Encodes the metadata as a block to append to a PR description.
    pub fn encode(&self) -> PromoterResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(format!(
            "\n{METADATA_BLOCK_OPEN}{}{METADATA_BLOCK_CLOSE}",
            STANDARD.encode(json)
        ))
    }

    /// Builds the metadata of a PR opened for `promotion`, one hop further down the chain.
    ///
    /// ## Takes
    /// - `pr_number` - The number of the PR whose merge triggered the promotion.
    /// - `pr_author` - The author of that PR, used if the chain has no original author yet.
    ///   `pr_number` likewise becomes the original PR number of a chain that has none.
    /// - `promotion` - The promotion being opened.
    ///
    /// ## Returns
    /// - The new metadata. Existing hops are carried over unchanged and exactly one hop is added.
    pub fn next_hop(&self, pr_number: u64, pr_author: &str, promotion: &PromotionInstance) -> Self {
        let mut prior_hops = self.prior_hops.clone();
        prior_hops.insert(
            pr_number,
            PromotionHop {
                source_path: promotion.metadata.source_path.clone(),
                target_paths: promotion.metadata.target_paths.clone(),
            },
        );

        Self {
            original_author: self.original_author_or(pr_author).to_string(),
            original_pr_number: self.original_pr_number.filter(|n| *n != 0).or(Some(pr_number)),
            promoted_paths: promotion.computed_sync_paths.keys().cloned().collect(),
            prior_hops,
        }
    }

    /// Returns the original author of the chain, or `fallback` if there is none.
    pub fn original_author_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.original_author.is_empty() {
            fallback
        } else {
            &self.original_author
        }
    }
}
