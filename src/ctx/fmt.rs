//! Contains the formatting logic for the [EventContext] struct.

use super::EventContext;
use crate::promotion::PromotionPlan;
use itertools::Itertools;
use std::fmt::{Result, Write};

/// The title of a promotion PR.
pub fn promotion_pr_title(components: &str, target_description: &str) -> String {
    format!("🚀 Promotion: {components} ➡️  {target_description}")
}

/// The message of a promotion commit.
pub fn promotion_commit_message(source_path: &str) -> String {
    format!("Syncing from {source_path}")
}

/// The comment posted on the triggering PR before a promotion PR is auto-merged.
pub fn auto_merge_comment(promotion_pr: u64) -> String {
    format!("Auto-merging promotion PR #{promotion_pr} ✅\n")
}

impl<'a> EventContext<'a> {
    /// Renders the promotion plan of the PR.
    pub fn render_plan(&self, plan: &PromotionPlan) -> String {
        let mut buf = String::new();
        // Writing into a String cannot fail.
        self.write_plan(&mut buf, plan).ok();
        buf
    }

    /// Writes the promotion plan of the PR to the given [Write]r.
    pub fn write_plan<W: Write>(&self, w: &mut W, plan: &PromotionPlan) -> Result {
        if plan.is_empty() {
            return writeln!(w, "Merging PR #{} would not trigger any promotion.", self.pr.number);
        }

        writeln!(w, "Merging PR #{} would trigger the following promotions:\n", self.pr.number)?;

        for promotion in plan.values() {
            let metadata = &promotion.metadata;
            write!(
                w,
                "**{}** from `{}` ➡️  {}",
                metadata.component_names.join(","),
                metadata.source_path,
                metadata.target_description
            )?;
            if metadata.auto_merge {
                write!(w, " (auto-merge)")?;
            }
            writeln!(w, "\n")?;

            for (target, source) in &promotion.computed_sync_paths {
                writeln!(w, "- `{source}` ➡️  `{target}`")?;
            }

            // Render what each component is held back from.
            for (component, skipped) in &metadata.per_component_skipped_target_paths {
                writeln!(
                    w,
                    "- `{component}` is not promoted to {}",
                    skipped.iter().sorted().map(|p| format!("`{p}`")).join(", ")
                )?;
            }
            writeln!(w)?;
        }

        Ok(())
    }
}
