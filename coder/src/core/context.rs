//! Accumulated knowledge the agent carries from turn to turn.

use crate::core::types::{DirEntry, GrepMatch};

/// Result of one project search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRecord {
    pub pattern: String,
    pub path: String,
    pub matches: Vec<GrepMatch>,
}

/// Result of one directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub path: String,
    pub entries: Vec<DirEntry>,
}

/// A write or edit that could not be applied this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditFailure {
    pub path: String,
    pub reason: String,
}

/// Files, search results, listings and check output gathered during a run.
///
/// Keyed collections keep first-insertion order so the rendered context stays
/// stable across turns; re-inserting a key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextAccumulator {
    files: Vec<(String, String)>,
    api_overviews: Vec<(String, String)>,
    searches: Vec<SearchRecord>,
    dirs: Vec<DirListing>,
    lint_output: String,
    compile_output: String,
    edit_failures: Vec<EditFailure>,
}

impl ContextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        upsert(&mut self.files, path.into(), content.into());
    }

    pub fn add_api_overview(&mut self, header: impl Into<String>, overview: impl Into<String>) {
        upsert(&mut self.api_overviews, header.into(), overview.into());
    }

    pub fn add_search(&mut self, pattern: &str, path: &str, matches: Vec<GrepMatch>) {
        self.searches.push(SearchRecord {
            pattern: pattern.to_string(),
            path: path.to_string(),
            matches,
        });
    }

    pub fn add_dir(&mut self, path: &str, entries: Vec<DirEntry>) {
        self.dirs.push(DirListing {
            path: path.to_string(),
            entries,
        });
    }

    pub fn set_lint(&mut self, output: impl Into<String>) {
        self.lint_output = output.into();
    }

    pub fn set_compile(&mut self, output: impl Into<String>) {
        self.compile_output = output.into();
    }

    pub fn add_edit_failure(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.edit_failures.push(EditFailure {
            path: path.into(),
            reason: reason.into(),
        });
    }

    /// Called at the start of every apply phase; failures only live for one turn.
    pub fn clear_edit_failures(&mut self) {
        self.edit_failures.clear();
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        lookup(&self.files, path)
    }

    pub fn files(&self) -> &[(String, String)] {
        &self.files
    }

    pub fn api_overview(&self, header: &str) -> Option<&str> {
        lookup(&self.api_overviews, header)
    }

    pub fn api_overviews(&self) -> &[(String, String)] {
        &self.api_overviews
    }

    pub fn searches(&self) -> &[SearchRecord] {
        &self.searches
    }

    pub fn dirs(&self) -> &[DirListing] {
        &self.dirs
    }

    pub fn lint_output(&self) -> &str {
        &self.lint_output
    }

    pub fn compile_output(&self) -> &str {
        &self.compile_output
    }

    pub fn edit_failures(&self) -> &[EditFailure] {
        &self.edit_failures
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.api_overviews.is_empty()
            && self.searches.is_empty()
            && self.dirs.is_empty()
            && self.lint_output.is_empty()
            && self.compile_output.is_empty()
            && self.edit_failures.is_empty()
    }
}

fn upsert(entries: &mut Vec<(String, String)>, key: String, value: String) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

fn lookup<'a>(entries: &'a [(String, String)], key: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_adding_a_file_keeps_its_position() {
        let mut ctx = ContextAccumulator::new();
        ctx.add_file("a.rs", "v1");
        ctx.add_file("b.rs", "b");
        ctx.add_file("a.rs", "v2");

        let paths: Vec<&str> = ctx.files().iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "b.rs"]);
        assert_eq!(ctx.file("a.rs"), Some("v2"));
    }

    #[test]
    fn clearing_edit_failures_keeps_everything_else() {
        let mut ctx = ContextAccumulator::new();
        ctx.add_file("a.rs", "a");
        ctx.set_lint("warning: unused");
        ctx.add_edit_failure("a.rs", "old text not found");

        ctx.clear_edit_failures();

        assert!(ctx.edit_failures().is_empty());
        assert_eq!(ctx.file("a.rs"), Some("a"));
        assert_eq!(ctx.lint_output(), "warning: unused");
        assert!(!ctx.is_empty());
    }
}
