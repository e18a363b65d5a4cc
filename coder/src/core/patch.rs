//! Fuzzy search/replace over file content.
//!
//! Matching runs in two tiers: an exact substring search, then a line-window
//! search where both sides are whitespace-normalized. The engine is pure; the
//! caller owns reading and the single whole-file write of the result.

use std::ops::Range;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("old text not found")]
    NotFound,
    #[error("old text matches {count} locations; add context or set replace_all")]
    AmbiguousMatch { count: usize },
    #[error("cannot create file: already exists")]
    CannotCreateExisting,
    #[error("file does not exist")]
    MissingFile,
}

/// Where an edit's old text was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSpan {
    /// Byte range of a verbatim occurrence.
    Bytes(Range<usize>),
    /// Line range of a normalized window match.
    Lines(Range<usize>),
}

/// Compute the new content for an edit against a file that may not exist yet.
///
/// Blank `old` is a create request and only succeeds when `existing` is `None`.
pub fn create_or_edit(
    existing: Option<&str>,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<String, EditError> {
    match existing {
        None if is_blank(old) => Ok(new.to_string()),
        None => Err(EditError::MissingFile),
        Some(content) => apply_edit(content, old, new, replace_all),
    }
}

/// Replace `old` with `new` inside `content`.
pub fn apply_edit(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<String, EditError> {
    if is_blank(old) {
        return Err(EditError::CannotCreateExisting);
    }

    let spans = find_matches(content, old);
    if spans.is_empty() {
        return Err(EditError::NotFound);
    }

    match spans[0] {
        MatchSpan::Bytes(_) => Ok(replace_bytes(content, &spans, new, replace_all)),
        MatchSpan::Lines(_) => {
            if spans.len() > 1 && !replace_all {
                return Err(EditError::AmbiguousMatch { count: spans.len() });
            }
            Ok(replace_lines(content, &non_overlapping(&spans), new))
        }
    }
}

/// Locate `old` in `content`.
///
/// Returns verbatim byte spans when any exist, otherwise every line window
/// (overlapping ones included) whose normalized text equals the normalized `old`.
pub fn find_matches(content: &str, old: &str) -> Vec<MatchSpan> {
    if old.is_empty() {
        return Vec::new();
    }
    let exact: Vec<MatchSpan> = content
        .match_indices(old)
        .map(|(start, m)| MatchSpan::Bytes(start..start + m.len()))
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let needle: Vec<String> = trim_blank_lines(old)
        .iter()
        .map(|line| normalize_line(line))
        .collect();
    if needle.is_empty() {
        return Vec::new();
    }
    let haystack: Vec<String> = content.split('\n').map(normalize_line).collect();

    if needle.len() > haystack.len() {
        return Vec::new();
    }
    (0..=haystack.len() - needle.len())
        .filter(|&i| haystack[i..i + needle.len()] == needle[..])
        .map(|i| MatchSpan::Lines(i..i + needle.len()))
        .collect()
}

/// Keep line windows top-down, dropping any that overlap one already kept.
fn non_overlapping(spans: &[MatchSpan]) -> Vec<MatchSpan> {
    let mut kept: Vec<MatchSpan> = Vec::new();
    let mut next_free = 0;
    for span in spans {
        match span {
            MatchSpan::Lines(range) if range.start >= next_free => {
                next_free = range.end;
                kept.push(span.clone());
            }
            _ => {}
        }
    }
    kept
}

/// Normalize one line for comparison: keep leading indentation, trim trailing
/// whitespace, collapse interior whitespace runs to a single space.
pub fn normalize_line(line: &str) -> String {
    let trimmed = line.trim_end();
    if trimmed.is_empty() {
        return String::new();
    }
    let body = trimmed.trim_start();
    let indent = &trimmed[..trimmed.len() - body.len()];
    let mut out = String::with_capacity(trimmed.len());
    out.push_str(indent);
    for (i, word) in body.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Lines of `text` without leading or trailing whitespace-only lines.
fn trim_blank_lines(text: &str) -> Vec<&str> {
    let lines: Vec<&str> = text.split('\n').collect();
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return Vec::new();
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    lines[first..=last].to_vec()
}

fn replace_bytes(content: &str, spans: &[MatchSpan], new: &str, replace_all: bool) -> String {
    let take = if replace_all { spans.len() } else { 1 };
    let mut out = content.to_string();
    for span in spans[..take].iter().rev() {
        if let MatchSpan::Bytes(range) = span {
            out.replace_range(range.clone(), new);
        }
    }
    out
}

fn replace_lines(content: &str, spans: &[MatchSpan], new: &str) -> String {
    let trimmed_new = new.trim_end();
    let replacement: Vec<&str> = if trimmed_new.is_empty() {
        vec![""]
    } else {
        trimmed_new.split('\n').collect()
    };

    let mut lines: Vec<&str> = content.split('\n').collect();
    // Bottom-up so earlier ranges stay valid as line counts shift.
    for span in spans.iter().rev() {
        if let MatchSpan::Lines(range) = span {
            lines.splice(range.clone(), replacement.iter().copied());
        }
    }
    lines.join("\n")
}
