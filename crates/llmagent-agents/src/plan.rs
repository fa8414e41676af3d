//! Plan recognition on free model text.
//!
//! Detection is textual: a reply counts as a plan when it carries the
//! `GOAL:` and `PLAN:` markers plus at least one numbered step. Prose that
//! happens to contain those words is misread as a plan, and a plan written
//! without them is missed.

use std::sync::LazyLock;

use regex::Regex;

static NUMBERED_STEP: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+\.\s+").ok());

static PLAN_BLOCK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?is)(GOAL:.*?PLAN:.*?TOOLS REQUIRED:.*?ESTIMATED STEPS:.*?)(?:\n\n|$)").ok()
});

pub fn has_plan_markers(text: &str) -> bool {
    text.contains("GOAL:") && text.contains("PLAN:")
}

pub fn has_numbered_steps(text: &str) -> bool {
    NUMBERED_STEP.as_ref().is_some_and(|re| re.is_match(text))
}

/// Whether `text` should go through plan approval.
pub fn detect_plan(text: &str) -> bool {
    has_plan_markers(text) && has_numbered_steps(text)
}

/// Whether a reply that also requests tools announces a changed plan. The
/// bare `REVISED PLAN` phrase only counts once planning is over.
pub fn is_revised_plan(text: &str, in_planning: bool) -> bool {
    text.contains("= REVISED PLAN")
        || text.contains("=== REVISED PLAN ===")
        || (!in_planning && text.contains("REVISED PLAN"))
}

/// First complete plan block in `text`, trimmed.
pub fn extract_plan(text: &str) -> Option<String> {
    let re = PLAN_BLOCK.as_ref()?;
    let caps = re.captures(text)?;
    let plan = caps.get(1)?.as_str().trim();
    (!plan.is_empty()).then(|| plan.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "GOAL: Commit the fix\n\nPLAN:\n1. Check status (git_status)\n2. Commit (git_commit)\n\nTOOLS REQUIRED: git_status, git_commit\n\nESTIMATED STEPS: 2";

    #[test]
    fn markers_without_steps_are_not_a_plan() {
        let text = "GOAL: understand things. PLAN: think about it.";
        assert!(has_plan_markers(text));
        assert!(!detect_plan(text));
    }

    #[test]
    fn full_plan_is_detected() {
        assert!(detect_plan(PLAN));
        assert!(!detect_plan("Here is the answer: 42."));
    }

    #[test]
    fn revised_plan_markers() {
        assert!(is_revised_plan("= REVISED PLAN\nGOAL: x", true));
        assert!(is_revised_plan("=== REVISED PLAN ===", true));
        assert!(!is_revised_plan("REVISED PLAN follows", true));
        assert!(is_revised_plan("REVISED PLAN follows", false));
        assert!(!is_revised_plan("continuing with step 2", false));
    }

    #[test]
    fn extracts_plan_block_from_transcript() {
        let transcript = format!("User asked for a commit.\n\n{PLAN}\n\nPlan approved.");
        let plan = extract_plan(&transcript).unwrap();
        assert!(plan.starts_with("GOAL: Commit the fix"));
        assert!(plan.ends_with("ESTIMATED STEPS: 2"));
        assert!(!plan.contains("Plan approved"));
    }

    #[test]
    fn extraction_is_case_insensitive_and_needs_all_sections() {
        assert!(extract_plan("goal: a\nplan: 1. b\ntools required: none\nestimated steps: 1").is_some());
        assert!(extract_plan("GOAL: a\nPLAN: 1. b").is_none());
    }
}
