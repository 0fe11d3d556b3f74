//! Promotion plans: what gets copied where when a PR merges.

use crate::{config::RepoConfig, errors::PromoterResult, forge::Forge};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

mod planner;
pub use planner::{changed_component_paths, ConfigPlanner};

/// The metadata of one planned promotion PR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionInstanceMetadata {
    /// The directory changes are promoted from.
    pub source_path: String,
    /// The directories changes are promoted to.
    pub target_paths: Vec<String>,
    /// Names of the promoted components.
    pub component_names: Vec<String>,
    /// Merge the promotion PR as soon as it is opened.
    pub auto_merge: bool,
    /// Per component, the target paths that component is not promoted to.
    pub per_component_skipped_target_paths: BTreeMap<String, Vec<String>>,
    /// Human description of the targets.
    pub target_description: String,
}

/// One planned promotion PR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionInstance {
    /// What the promotion is.
    pub metadata: PromotionInstanceMetadata,
    /// Target component path to source component path, one directory sync each.
    pub computed_sync_paths: BTreeMap<String, String>,
}

/// A promotion plan, keyed by a stable group key.
pub type PromotionPlan = BTreeMap<String, PromotionInstance>;

/// The PR a plan is generated for.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    /// The PR number.
    pub pr_number: u64,
    /// The labels on the PR.
    pub labels: &'a [String],
    /// The ref component configuration is read at.
    pub git_ref: &'a str,
}

/// Produces promotion plans and the list of components a PR touches.
#[async_trait]
pub trait PromotionPlanner: Send + Sync {
    /// Returns the paths of every component changed by PR `pr_number`.
    async fn changed_components(
        &self,
        forge: &dyn Forge,
        pr_number: u64,
        config: &RepoConfig,
    ) -> PromoterResult<Vec<String>>;

    /// Generates the promotion plan of a PR.
    async fn plan(
        &self,
        forge: &dyn Forge,
        request: PlanRequest<'_>,
        config: &RepoConfig,
    ) -> PromoterResult<PromotionPlan>;
}

/// Selects the target paths to leave out when rendering the chain of `promotion`.
///
/// If any promoted component is promoted to every target, nothing is skipped. Otherwise the skip set of the
/// component that skips the fewest targets is used, so the rendering errs on the side of listing more paths.
pub fn promotion_skip_paths(promotion: &PromotionInstance) -> BTreeSet<String> {
    let skipped = &promotion.metadata.per_component_skipped_target_paths;
    if skipped.is_empty() {
        return BTreeSet::new();
    }

    if promotion
        .metadata
        .component_names
        .iter()
        .any(|c| !skipped.contains_key(c))
    {
        return BTreeSet::new();
    }

    skipped
        .values()
        .min_by_key(|paths| paths.len())
        .map(|paths| paths.iter().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::{promotion_skip_paths, PromotionInstance, PromotionInstanceMetadata};
    use std::collections::{BTreeMap, BTreeSet};

    fn with_skips(components: &[&str], skips: &[(&str, &[&str])]) -> PromotionInstance {
        PromotionInstance {
            metadata: PromotionInstanceMetadata {
                component_names: components.iter().map(|c| c.to_string()).collect(),
                per_component_skipped_target_paths: skips
                    .iter()
                    .map(|(c, p)| (c.to_string(), p.iter().map(|p| p.to_string()).collect()))
                    .collect::<BTreeMap<_, _>>(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn no_skip_entries() {
        assert!(promotion_skip_paths(&with_skips(&[], &[])).is_empty());
    }

    #[test]
    fn single_component_skips() {
        let promotion = with_skips(&[], &[("component1", &["targetPath1", "targetPath2"])]);
        assert_eq!(promotion_skip_paths(&promotion), set(&["targetPath1", "targetPath2"]));
    }

    #[test]
    fn fewest_skips_win() {
        let promotion = with_skips(
            &[],
            &[
                ("component1", &["targetPath1", "targetPath2", "targetPath3"]),
                ("component2", &["targetPath3"]),
                ("component3", &["targetPath1", "targetPath2"]),
            ],
        );
        assert_eq!(promotion_skip_paths(&promotion), set(&["targetPath3"]));
    }

    #[test]
    fn unskipped_component_disables_skipping() {
        let promotion = with_skips(&["component1", "component2"], &[("component1", &["targetPath1"])]);
        assert!(promotion_skip_paths(&promotion).is_empty());
    }
}
