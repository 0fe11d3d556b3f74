//! Deterministic naming of promotion branches.

use crate::constants::{
    BRANCH_HASH_SUFFIX_LEN, MAX_ORIGIN_BRANCH_LEN, PROMOTION_BRANCH_PREFIX,
};
use sha1::{Digest, Sha1};

/// Derives the name of the branch that carries a promotion.
///
/// The target paths are hashed into a short suffix so that two promotions from the same PR into different
/// target sets get different branches, even once the origin branch has been truncated. The paths are sorted
/// and joined with `_` before hashing, so the order the planner produced them in does not matter.
///
/// The join is not collision resistant when paths contain `_`: `["env/prod_eu"]` and `["env/prod", "eu"]`
/// hash to the same suffix.
///
/// ## Takes
/// - `pr_number` - The number of the PR that triggered the promotion.
/// - `origin_branch` - The head branch of the triggering PR.
/// - `target_paths` - The target paths of the promotion.
///
/// ## Returns
/// - A branch name of the form `promotions/<pr>-<origin>-<hash>`, at most 250 bytes long.
pub fn promotion_branch_name(pr_number: u64, origin_branch: &str, target_paths: &[String]) -> String {
    // Hash the target path set.
    let mut sorted = target_paths.to_vec();
    sorted.sort();
    let digest = Sha1::digest(sorted.join("_").as_bytes());
    let suffix = &hex::encode(digest)[..BRANCH_HASH_SUFFIX_LEN];

    // Flatten and truncate the origin branch.
    let flattened = origin_branch.replace('/', "-");
    let origin = truncate_at_char_boundary(&flattened, MAX_ORIGIN_BRANCH_LEN);

    format!("{PROMOTION_BRANCH_PREFIX}{pr_number}-{origin}-{suffix}")
}

/// Truncates `s` to at most `max` bytes without splitting a UTF-8 sequence.
fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
