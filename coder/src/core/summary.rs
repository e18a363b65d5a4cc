//! Turn summary fed back into the next prompt.

use crate::core::context::EditFailure;

const EXCERPT_CHARS: usize = 200;
const LINT_PASSED_MARKER: &str = "All checks passed";

/// What one turn did to the project, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnEffects {
    pub written: Vec<String>,
    pub edited: Vec<String>,
    pub failures: Vec<EditFailure>,
    pub done: bool,
    pub lint: Option<String>,
    pub compile: Option<String>,
}

/// Build a one-line digest such as `Wrote: a.rs Edited: b.rs Lint: passed`.
///
/// Returns `No changes.` when nothing happened.
pub fn build_turn_summary(effects: &TurnEffects) -> String {
    let mut parts = Vec::new();
    if !effects.written.is_empty() {
        parts.push(format!("Wrote: {}", effects.written.join(", ")));
    }
    if !effects.edited.is_empty() {
        parts.push(format!("Edited: {}", effects.edited.join(", ")));
    }
    if !effects.failures.is_empty() {
        let failed: Vec<String> = effects
            .failures
            .iter()
            .map(|f| format!("{} ({})", f.path, f.reason))
            .collect();
        parts.push(format!("Failed: {}", failed.join("; ")));
    }
    if effects.done {
        parts.push("Done.".to_string());
    }
    if let Some(lint) = &effects.lint {
        if lint_passed(lint) {
            parts.push("Lint: passed".to_string());
        } else {
            parts.push(format!("Lint: {}...", excerpt(lint)));
        }
    }
    if let Some(compile) = effects.compile.as_deref().filter(|c| !c.trim().is_empty()) {
        parts.push(format!("Compile: {}...", excerpt(compile)));
    }

    if parts.is_empty() {
        "No changes.".to_string()
    } else {
        parts.join(" ")
    }
}

/// Any mention of "error" overrides the pass marker.
fn lint_passed(output: &str) -> bool {
    if output.to_lowercase().contains("error") {
        return false;
    }
    output.trim().is_empty() || output.contains(LINT_PASSED_MARKER)
}

fn excerpt(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
