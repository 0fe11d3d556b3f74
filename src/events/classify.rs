//! Classification of pull request events, and checkbox toggle detection on comment edits.

use super::PullRequestEvent;
use crate::constants::SHOW_PLAN_LABEL;
use regex::Regex;

/// The workflow a pull request event triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrEventKind {
    /// The PR was merged: open the promotion PRs.
    Merged,
    /// The PR content changed: comment the diff.
    Changed,
    /// The plan was requested: comment the promotion plan.
    ShowPlan,
}

impl std::fmt::Display for PrEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merged => write!(f, "merged"),
            Self::Changed => write!(f, "changed"),
            Self::ShowPlan => write!(f, "show-plan"),
        }
    }
}

/// Classifies a pull request event. The first matching rule wins.
///
/// ## Returns
/// - `Some(kind)` - The workflow to run.
/// - `None` - The event is ignored.
pub fn classify(event: &PullRequestEvent) -> Option<PrEventKind> {
    match event.action.as_str() {
        "closed" if event.pull_request.merged => Some(PrEventKind::Merged),
        "opened" | "reopened" | "synchronize" => Some(PrEventKind::Changed),
        "labeled" if event.label.as_ref().is_some_and(|l| l.name == SHOW_PLAN_LABEL) => {
            Some(PrEventKind::ShowPlan)
        }
        _ => None,
    }
}

/// Extracts the state of the checkbox marked with `id` from `body`.
fn checkbox_state(re: &Regex, body: &str) -> Option<bool> {
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str() == "x")
}

/// Compares the checkbox marked with `id` across a comment edit.
///
/// ## Takes
/// - `new_body` - The comment text after the edit.
/// - `old_body` - The comment text before the edit.
/// - `id` - The marker token of the checkbox.
///
/// ## Returns
/// - `(was_checked, is_checked)`. If either body lacks the checkbox, `(false, false)`.
pub fn analyze_checkbox_update(new_body: &str, old_body: &str, id: &str) -> (bool, bool) {
    let pattern = format!(r"(?m)^\s*-\s*\[(.)\]\s*<!-- {} -->.*$", regex::escape(id));
    let Ok(re) = Regex::new(&pattern) else {
        return (false, false);
    };

    match (checkbox_state(&re, old_body), checkbox_state(&re, new_body)) {
        (Some(was), Some(is)) => (was, is),
        _ => (false, false),
    }
}

#[cfg(test)]
mod test {
    use super::{analyze_checkbox_update, classify, PrEventKind};
    use crate::events::{Label, PullRequestEvent};

    const ID: &str = "promoter-branch-sync";

    fn event(action: &str, merged: bool, added_label: Option<&str>) -> PullRequestEvent {
        let mut event = PullRequestEvent {
            action: action.to_string(),
            label: added_label.map(|name| Label {
                name: name.to_string(),
            }),
            ..Default::default()
        };
        event.pull_request.merged = merged;
        event
    }

    #[test]
    fn classification_rules() {
        assert_eq!(classify(&event("closed", true, None)), Some(PrEventKind::Merged));
        assert_eq!(classify(&event("closed", false, None)), None);
        assert_eq!(classify(&event("opened", false, None)), Some(PrEventKind::Changed));
        assert_eq!(classify(&event("reopened", false, None)), Some(PrEventKind::Changed));
        assert_eq!(classify(&event("synchronize", false, None)), Some(PrEventKind::Changed));
        assert_eq!(
            classify(&event("labeled", false, Some("show-plan"))),
            Some(PrEventKind::ShowPlan)
        );
        assert_eq!(classify(&event("labeled", false, Some("ready"))), None);
        assert_eq!(classify(&event("edited", false, None)), None);
    }

    #[test]
    fn checkbox_checked() {
        let old = format!("Diff\n- [ ] <!-- {ID} --> Set delivery apps target revision to `feature`");
        let new = format!("Diff\n- [x] <!-- {ID} --> Set delivery apps target revision to `feature`");
        assert_eq!(analyze_checkbox_update(&new, &old, ID), (false, true));
    }

    #[test]
    fn checkbox_unchecked() {
        let old = format!("  - [x]  <!-- {ID} --> sync");
        let new = format!("  - [ ]  <!-- {ID} --> sync");
        assert_eq!(analyze_checkbox_update(&new, &old, ID), (true, false));
    }

    #[test]
    fn checkbox_absent_or_unchanged() {
        assert_eq!(analyze_checkbox_update("no box", "no box", ID), (false, false));

        let checked = format!("- [x] <!-- {ID} --> sync");
        assert_eq!(analyze_checkbox_update(&checked, "no box", ID), (false, false));
        assert_eq!(analyze_checkbox_update(&checked, &checked, ID), (true, true));

        // Other checkboxes do not count.
        let other = "- [x] <!-- something-else --> sync";
        assert_eq!(analyze_checkbox_update(other, "- [ ] <!-- something-else --> sync", ID), (false, false));
    }
}
