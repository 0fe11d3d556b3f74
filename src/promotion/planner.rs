//! The in-repo configuration driven [PromotionPlanner].

use super::{PlanRequest, PromotionInstance, PromotionPlan, PromotionPlanner};
use crate::{
    config::{ComponentConfig, PromotionPath, RepoConfig},
    errors::PromoterResult,
    forge::Forge,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Plans promotions from the `promotion_paths` of the in-repo configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigPlanner;

/// Joins a directory and a relative path with a single separator.
fn join(dir: &str, rest: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), rest)
}

/// Returns the name of the component `file` belongs to under `promotion_path`, if any.
///
/// The component name is the `1 + component_path_extra_depth` path segments following the source path. Files
/// that sit directly at that depth are not part of any component.
fn component_of(file: &str, promotion_path: &PromotionPath) -> Option<String> {
    let source = promotion_path.source_path.trim_end_matches('/');
    let rest = file.strip_prefix(source)?.strip_prefix('/')?;

    let depth = 1 + promotion_path.component_path_extra_depth;
    let segments = rest.split('/').collect::<Vec<_>>();
    (segments.len() > depth).then(|| segments[..depth].join("/"))
}

/// Returns the paths of the components touched by `files`, in first-seen order.
///
/// ## Takes
/// - `files` - The paths changed by a PR.
/// - `config` - The in-repo configuration.
pub fn changed_component_paths(files: &[String], config: &RepoConfig) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut components = Vec::new();

    for file in files {
        for promotion_path in &config.promotion_paths {
            let Some(component) = component_of(file, promotion_path) else {
                continue;
            };
            let path = join(&promotion_path.source_path, &component);
            if seen.insert(path.clone()) {
                components.push(path);
            }
        }
    }

    components
}

#[async_trait]
impl PromotionPlanner for ConfigPlanner {
    async fn changed_components(
        &self,
        forge: &dyn Forge,
        pr_number: u64,
        config: &RepoConfig,
    ) -> PromoterResult<Vec<String>> {
        let files = forge.pull_request_files(pr_number).await?;
        Ok(changed_component_paths(&files, config))
    }

    async fn plan(
        &self,
        forge: &dyn Forge,
        request: PlanRequest<'_>,
        config: &RepoConfig,
    ) -> PromoterResult<PromotionPlan> {
        let files = forge.pull_request_files(request.pr_number).await?;
        let mut plan = PromotionPlan::new();

        for promotion_path in &config.promotion_paths {
            // Every listed label must be on the PR.
            let labels_match = promotion_path
                .conditions
                .pr_has_labels
                .iter()
                .all(|l| request.labels.contains(l));
            if !labels_match {
                debug!(source = %promotion_path.source_path, "PR lacks required labels, skipping path");
                continue;
            }

            let components = files
                .iter()
                .filter_map(|f| component_of(f, promotion_path))
                .collect::<BTreeSet<_>>();

            for component in components {
                let source_component = join(&promotion_path.source_path, &component);
                let component_config =
                    ComponentConfig::load(forge, &source_component, request.git_ref).await?;

                for pr in &promotion_path.promotion_prs {
                    let key = format!("{}>{}", promotion_path.source_path, pr.target_paths.join("|"));
                    let instance = plan.entry(key).or_insert_with(|| {
                        let mut instance = PromotionInstance::default();
                        instance.metadata.source_path = promotion_path.source_path.clone();
                        instance.metadata.target_paths = pr.target_paths.clone();
                        instance.metadata.auto_merge = promotion_path.conditions.auto_merge;
                        instance.metadata.target_description = pr
                            .target_description
                            .clone()
                            .unwrap_or_else(|| pr.target_paths.join(","));
                        instance
                    });

                    let mut allowed_any = false;
                    for target in &pr.target_paths {
                        let target_component = join(target, &component);
                        if component_config.allows_target(&target_component)? {
                            instance
                                .computed_sync_paths
                                .insert(target_component, source_component.clone());
                            allowed_any = true;
                        } else {
                            info!(component = %source_component, target = %target_component, "Promotion target blocked by component configuration");
                            instance
                                .metadata
                                .per_component_skipped_target_paths
                                .entry(component.clone())
                                .or_default()
                                .push(target.clone());
                        }
                    }

                    if allowed_any && !instance.metadata.component_names.contains(&component) {
                        instance.metadata.component_names.push(component.clone());
                    }
                }
            }
        }

        // Groups where every target was blocked promote nothing.
        plan.retain(|_, instance| !instance.computed_sync_paths.is_empty());
        Ok(plan)
    }
}
