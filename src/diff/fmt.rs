//! Contains the rendering logic for [DiffCommentData].

use super::{AppDiffResult, DiffCommentData};
use crate::{
    constants::BRANCH_SYNC_CHECKBOX_ID,
    errors::{PromoterError, PromoterResult},
};
use itertools::Itertools;
use std::fmt::Write;
use tracing::{debug, warn};

/// Appends a GitHub alert block of `kind` holding `text`.
fn alert(buf: &mut String, kind: &str, text: &str) -> std::fmt::Result {
    write!(buf, "> [!{kind}]\n> {text}\n\n")
}

/// Renders the diff bodies, or only the object identifiers if `concise`.
fn object_diffs(result: &AppDiffResult, concise: bool) -> String {
    result
        .diff_elements
        .iter()
        .filter(|o| !o.diff.is_empty())
        .map(|o| {
            let id = format!("{}/{}/{}", o.namespace, o.kind, o.name);
            if concise {
                id
            } else {
                format!("{id}:\n{}", o.diff.trim_end_matches('\n'))
            }
        })
        .join("\n")
}

fn write_app(buf: &mut String, result: &AppDiffResult, concise: bool) -> std::fmt::Result {
    let app_link = format!("**[{}]({})**", result.app_name, result.app_url);

    if let Some(error) = &result.diff_error {
        alert(
            buf,
            "CAUTION",
            &format!("**Error getting diff from the delivery controller** (`{}`)", result.component_path),
        )?;
        writeln!(buf, "Please check the conditions of {app_link} for more details.\n")?;
        if result.temporarily_created {
            alert(
                buf,
                "WARNING",
                "The temporary application was kept for investigation, please make sure to clean it up later!",
            )?;
        }
        return write!(buf, "```\n{error}\n```\n\n");
    }

    writeln!(buf, "{app_link} @ `{}`\n", result.component_path)?;

    if result.temporarily_created {
        alert(
            buf,
            "NOTE",
            "A temporary application was created to render this preview. It only shows up in the delivery controller UI for a few seconds.",
        )?;
    } else {
        // Only abnormal states are worth a badge.
        if result.health_status != "Healthy" {
            alert(
                buf,
                "CAUTION",
                &format!("The application health status is currently {}", result.health_status),
            )?;
        }
        if result.sync_status != "Synced" {
            alert(
                buf,
                "WARNING",
                &format!("The application sync status is currently {}", result.sync_status),
            )?;
        }
        if !result.auto_sync_enabled {
            alert(
                buf,
                "NOTE",
                "This application does not have `auto-sync` enabled, merging this PR will **not** apply changes without additional actions.",
            )?;
        }
    }

    if result.has_diff {
        write!(
            buf,
            "<details><summary>Diff (Click to expand):</summary>\n\n```diff\n{}\n```\n\n</details>\n\n",
            object_diffs(result, concise)
        )
    } else if result.synced_from_branch {
        alert(
            buf,
            "NOTE",
            "The application already tracks this branch and auto-syncs it. Diff calculation was skipped.",
        )
    } else {
        writeln!(buf, "No diff 🤷\n")
    }
}

/// Renders one diff comment.
///
/// ## Takes
/// - `data` - The applications to render.
/// - `concise` - Render only object identifiers instead of the diff bodies.
/// - `part` - The 1-based position of this comment in a split, or `0` if the report is not split.
/// - `total` - The number of comments in the split.
///
/// ## Returns
/// - The rendered markdown.
pub fn build_diff_comment(
    data: &DiffCommentData,
    concise: bool,
    part: usize,
    total: usize,
) -> PromoterResult<String> {
    let mut buf = String::new();

    if part != 0 {
        let component = data
            .results
            .first()
            .map(|r| r.component_path.as_str())
            .unwrap_or_default();
        writeln!(buf, "Component {part}/{total}: {component} (Split for comment size)")?;
    }
    if concise {
        writeln!(
            buf,
            "Diff of delivery applications (concise view, full diff didn't fit a comment):\n"
        )?;
    } else {
        writeln!(buf, "Diff of delivery applications:\n")?;
    }

    for result in &data.results {
        write_app(&mut buf, result, concise)?;
    }

    if data.display_sync_branch_checkbox {
        writeln!(
            buf,
            "- [ ] <!-- {BRANCH_SYNC_CHECKBOX_ID} --> Set delivery apps target revision to `{}`",
            data.branch_name
        )?;
    }

    Ok(buf)
}

/// Renders a diff report as comments no larger than `max_size` each.
///
/// The whole report is rendered as a single comment if it fits. Otherwise every application gets its own
/// comment, falling back to the concise rendering for applications whose full diff does not fit.
///
/// ## Returns
/// - `Ok(comments)` - The comments to post, in order.
/// - `Err(PromoterError::CommentTooLarge)` - Even the concise rendering of an application does not fit.
pub fn render_diff_comments(data: &DiffCommentData, max_size: usize) -> PromoterResult<Vec<String>> {
    let full = build_diff_comment(data, false, 0, 0)?;
    if full.len() < max_size {
        return Ok(vec![full]);
    }

    let total = data.results.len();
    debug!(size = full.len(), max_size, components = total, "Splitting diff comment per component");

    let mut comments = Vec::with_capacity(total);
    for (i, result) in data.results.iter().enumerate() {
        let scoped = DiffCommentData {
            results: vec![result.clone()],
            display_sync_branch_checkbox: data.display_sync_branch_checkbox,
            branch_name: data.branch_name.clone(),
        };

        let body = build_diff_comment(&scoped, false, i + 1, total)?;
        if body.len() < max_size {
            comments.push(body);
            continue;
        }

        warn!(component = %result.component_path, size = body.len(), "Component diff too large, using concise view");
        let concise = build_diff_comment(&scoped, true, i + 1, total)?;
        if concise.len() >= max_size {
            return Err(PromoterError::CommentTooLarge {
                component: result.component_path.clone(),
                size: concise.len(),
                max: max_size,
            });
        }
        comments.push(concise);
    }

    Ok(comments)
}

#[cfg(test)]
mod test {
    use super::{build_diff_comment, render_diff_comments};
    use crate::{
        diff::{AppDiffResult, DiffCommentData, ObjectDiff},
        errors::PromoterError,
    };

    fn app(path: &str, diff: Option<String>) -> AppDiffResult {
        AppDiffResult {
            component_path: path.to_string(),
            app_name: path.replace('/', "-"),
            app_url: format!("https://cd.example.com/applications/{}", path.replace('/', "-")),
            health_status: "Healthy".to_string(),
            sync_status: "Synced".to_string(),
            auto_sync_enabled: true,
            has_diff: diff.is_some(),
            diff_elements: diff
                .map(|d| {
                    vec![ObjectDiff {
                        namespace: "default".to_string(),
                        kind: "Deployment".to_string(),
                        name: "web".to_string(),
                        diff: d,
                    }]
                })
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    fn data(results: Vec<AppDiffResult>) -> DiffCommentData {
        DiffCommentData {
            results,
            display_sync_branch_checkbox: true,
            branch_name: "feature".to_string(),
        }
    }

    #[test]
    fn small_report_is_one_comment() {
        let report = data(vec![
            app("env/staging/app", Some("-replicas: 1\n+replicas: 2".to_string())),
            app("env/staging/web", None),
        ]);

        let comments = render_diff_comments(&report, 65536).unwrap();
        assert_eq!(comments.len(), 1);
        let comment = &comments[0];
        assert!(comment.starts_with("Diff of delivery applications:\n"));
        assert!(comment.contains("default/Deployment/web:\n-replicas: 1\n+replicas: 2"));
        assert!(comment.contains("No diff 🤷"));
        assert!(!comment.contains("[!CAUTION]"));
        assert_eq!(comment.matches("<!-- promoter-branch-sync -->").count(), 1);
        assert!(comment.ends_with("Set delivery apps target revision to `feature`\n"));
    }

    #[test]
    fn oversized_report_splits_per_component() {
        let report = data(vec![
            app("env/staging/app", Some("+a".repeat(200))),
            app("env/staging/web", Some("+b".repeat(200))),
            app("env/staging/db", Some("+c".repeat(200))),
        ]);
        let max = build_diff_comment(&report, false, 0, 0).unwrap().len();

        let comments = render_diff_comments(&report, max).unwrap();
        assert_eq!(comments.len(), 3);
        for (i, (comment, path)) in comments
            .iter()
            .zip(["env/staging/app", "env/staging/web", "env/staging/db"])
            .enumerate()
        {
            assert!(comment.len() < max);
            assert!(comment.starts_with(&format!("Component {}/3: {path} (Split for comment size)\n", i + 1)));
            assert_eq!(comment.matches("@ `").count(), 1);
            assert!(comment.contains("<!-- promoter-branch-sync -->"));
        }
    }

    #[test]
    fn huge_component_uses_concise_view() {
        let huge = app("env/staging/app", Some("+x".repeat(5000)));
        let small = app("env/staging/web", None);
        let report = data(vec![huge.clone(), small.clone()]);

        let concise_huge = build_diff_comment(&data(vec![huge]), true, 1, 2).unwrap();
        let full_small = build_diff_comment(&data(vec![small]), false, 2, 2).unwrap();
        let max = concise_huge.len().max(full_small.len()) + 1;

        let comments = render_diff_comments(&report, max).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0], concise_huge);
        assert!(comments[0].contains("concise view"));
        assert!(comments[0].contains("default/Deployment/web\n"));
        assert!(!comments[0].contains("+x+x"));
        assert_eq!(comments[1], full_small);
    }

    #[test]
    fn concise_overflow_is_an_error() {
        let report = data(vec![app("env/staging/app", Some("+x".repeat(100)))]);
        match render_diff_comments(&report, 10) {
            Err(PromoterError::CommentTooLarge { component, max, .. }) => {
                assert_eq!(component, "env/staging/app");
                assert_eq!(max, 10);
            }
            other => panic!("expected CommentTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn errors_replace_diff_elements() {
        let mut failed = app("env/staging/app", Some("+should-not-render".to_string()));
        failed.diff_error = Some("rpc error: application not found".to_string());
        failed.temporarily_created = true;

        let comment = build_diff_comment(&data(vec![failed]), false, 0, 0).unwrap();
        assert!(comment.contains("> [!CAUTION]\n> **Error getting diff from the delivery controller** (`env/staging/app`)"));
        assert!(comment.contains("```\nrpc error: application not found\n```"));
        assert!(comment.contains("[!WARNING]"));
        assert!(!comment.contains("should-not-render"));
    }

    #[test]
    fn abnormal_states_get_badges() {
        let mut degraded = app("env/staging/app", None);
        degraded.health_status = "Degraded".to_string();
        degraded.sync_status = "OutOfSync".to_string();
        degraded.auto_sync_enabled = false;

        let mut report = data(vec![degraded]);
        report.display_sync_branch_checkbox = false;
        let comment = build_diff_comment(&report, false, 0, 0).unwrap();

        assert!(comment.contains("health status is currently Degraded"));
        assert!(comment.contains("sync status is currently OutOfSync"));
        assert!(comment.contains("`auto-sync`"));
        assert!(!comment.contains("promoter-branch-sync"));
    }
}
