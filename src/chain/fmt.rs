//! Contains the formatting logic for [ChainMetadata].

use super::ChainMetadata;
use crate::{constants::MARKDOWN_TAB, errors::PromoterResult};
use std::{collections::BTreeSet, fmt::Write};

/// Renders the hops of a promotion chain as indented markdown, one hop per level.
///
/// ## Takes
/// - `hop_keys` - The hop keys to render, in order. Callers pass the sorted keys of `metadata.prior_hops`.
/// - `metadata` - The chain metadata.
/// - `skip_paths` - Target paths to leave out of every hop.
///
/// ## Returns
/// - The rendered chain. Target paths within a hop are sorted.
pub fn render_hops(hop_keys: &[u64], metadata: &ChainMetadata, skip_paths: &BTreeSet<String>) -> String {
    let mut buf = String::new();

    for (depth, key) in hop_keys.iter().enumerate() {
        let Some(hop) = metadata.prior_hops.get(key) else {
            continue;
        };

        let mut targets = hop
            .target_paths
            .iter()
            .filter(|t| !skip_paths.contains(*t))
            .map(String::as_str)
            .collect::<Vec<_>>();
        targets.sort_unstable();
        targets.dedup();

        let indent = MARKDOWN_TAB.repeat(depth);
        let child_indent = MARKDOWN_TAB.repeat(depth + 1);
        let targets = targets.join(&format!("`  \n{child_indent}`"));

        // Writing into a String cannot fail.
        write!(
            buf,
            "{indent}↘️  #{key}  `{}` ➡️  \n{child_indent}`{targets}`  \n",
            hop.source_path
        )
        .ok();
    }

    buf
}

/// Renders the description of a promotion PR, with `metadata` embedded.
///
/// ## Takes
/// - `components` - Comma separated names of the promoted components.
/// - `metadata` - The metadata of the new PR.
/// - `skip_paths` - Target paths to leave out of the rendered chain.
pub fn promotion_pr_body(
    components: &str,
    metadata: &ChainMetadata,
    skip_paths: &BTreeSet<String>,
) -> PromoterResult<String> {
    let hop_keys = metadata.prior_hops.keys().copied().collect::<Vec<_>>();

    let mut body = format!("Promotion path({components}):\n\n");
    body.push_str(&render_hops(&hop_keys, metadata, skip_paths));
    body.push_str(&metadata.encode()?);
    Ok(body)
}
