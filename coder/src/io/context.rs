//! Filling the [`ContextAccumulator`] from the workspace.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::core::context::ContextAccumulator;
use crate::core::types::ContextRequest;
use crate::io::workspace::Workspace;

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)@([^\s@]+)").expect("mention regex should be valid"));

/// Answer every context request in order, recording results in `ctx`.
///
/// A failed read is cached as an `(error reading: ...)` body so the model sees
/// why; failed searches and listings record an empty result.
pub fn fulfill_requests(
    workspace: &dyn Workspace,
    ctx: &mut ContextAccumulator,
    requests: &[ContextRequest],
) {
    for request in requests {
        match request {
            ContextRequest::ReadFile { path } => match workspace.read_file(path) {
                Ok(content) => {
                    debug!(path = %path, bytes = content.len(), "read file");
                    ctx.add_file(path.as_str(), content);
                }
                Err(err) => {
                    warn!(path = %path, err = %err, "read failed");
                    ctx.add_file(path.as_str(), format!("(error reading: {err})"));
                }
            },
            ContextRequest::Grep { pattern, path } => {
                let matches = workspace.grep(pattern, path).unwrap_or_else(|err| {
                    warn!(pattern = %pattern, path = %path, err = %err, "grep failed");
                    Vec::new()
                });
                debug!(pattern = %pattern, count = matches.len(), "grep");
                ctx.add_search(pattern, path, matches);
            }
            ContextRequest::ListDir { path } => {
                let entries = workspace.list_dir(path).unwrap_or_else(|err| {
                    warn!(path = %path, err = %err, "list_dir failed");
                    Vec::new()
                });
                ctx.add_dir(path, entries);
            }
            ContextRequest::ApiOverview { header } => {
                let overview = workspace
                    .api_overview(header)
                    .unwrap_or_else(|err| format!("(error reading header {header}: {err})"));
                ctx.add_api_overview(header.as_str(), overview);
            }
        }
    }
}

/// Paths named as `@path` in `task` that resolve (from `cwd`) to files inside
/// the project, relative to the project root, deduplicated in mention order.
pub fn extract_mentions(task: &str, cwd: &Path, project_root: &Path) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in MENTION_RE.captures_iter(task) {
        let raw = caps[1].trim_end_matches(['.', ',', ';', ':', ')', '!', '?', '"', '\'']);
        if raw.is_empty() {
            continue;
        }
        let candidate = cwd.join(raw);
        let Ok(full) = candidate.canonicalize() else {
            continue;
        };
        if !full.is_file() {
            continue;
        }
        let Ok(rel) = full.strip_prefix(project_root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !found.contains(&rel) {
            found.push(rel);
        }
    }
    found
}

/// Read every `@path` mention into `ctx` before the first turn.
///
/// Mentions that cannot be read are logged and skipped.
pub fn preload_mentions(
    task: &str,
    cwd: &Path,
    workspace: &dyn Workspace,
    ctx: &mut ContextAccumulator,
) {
    for path in extract_mentions(task, cwd, workspace.root()) {
        match workspace.read_file(&path) {
            Ok(content) => {
                info!(path = %path, "pre-loaded mention");
                ctx.add_file(path, content);
            }
            Err(err) => warn!(path = %path, err = %err, "could not pre-load mention"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::io::workspace::ProjectWorkspace;

    fn project() -> (tempfile::TempDir, ProjectWorkspace) {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        fs::write(temp.path().join("src/main.py"), "print('hi')\n").expect("write");
        let ws = ProjectWorkspace::new(temp.path()).expect("workspace");
        (temp, ws)
    }

    #[test]
    fn requests_fill_accumulator_in_order() {
        let (_temp, ws) = project();
        let mut ctx = ContextAccumulator::new();
        let requests = vec![
            ContextRequest::ReadFile {
                path: "src/main.py".to_string(),
            },
            ContextRequest::ReadFile {
                path: "missing.py".to_string(),
            },
            ContextRequest::Grep {
                pattern: "print".to_string(),
                path: ".".to_string(),
            },
            ContextRequest::ListDir {
                path: "src".to_string(),
            },
            ContextRequest::ApiOverview {
                header: "absent.h".to_string(),
            },
        ];

        fulfill_requests(&ws, &mut ctx, &requests);

        assert_eq!(ctx.file("src/main.py"), Some("print('hi')\n"));
        let missing = ctx.file("missing.py").expect("error body cached");
        assert!(missing.starts_with("(error reading: "), "{missing}");
        assert_eq!(ctx.searches().len(), 1);
        assert_eq!(ctx.searches()[0].matches[0].file, "src/main.py");
        assert_eq!(ctx.dirs()[0].entries[0].name, "main.py");
        assert!(ctx.api_overview("absent.h").expect("overview").contains("not found"));
    }

    #[test]
    fn escaping_read_is_recorded_as_error_body() {
        let (_temp, ws) = project();
        let mut ctx = ContextAccumulator::new();
        fulfill_requests(
            &ws,
            &mut ctx,
            &[ContextRequest::ReadFile {
                path: "../etc/passwd".to_string(),
            }],
        );
        let body = ctx.file("../etc/passwd").expect("cached");
        assert!(body.contains("path outside project"), "{body}");
    }

    #[test]
    fn mentions_resolve_relative_to_cwd_and_stay_in_project() {
        let (temp, ws) = project();
        let root = ws.root().to_path_buf();
        let task = "Fix @src/main.py, then compare with @nope.py and @../outside (see @src/main.py).";
        let mentions = extract_mentions(task, &root, &root);
        assert_eq!(mentions, vec!["src/main.py".to_string()]);

        let from_src = extract_mentions("look at @main.py", &root.join("src"), &root);
        assert_eq!(from_src, vec!["src/main.py".to_string()]);

        let mut ctx = ContextAccumulator::new();
        preload_mentions(task, temp.path(), &ws, &mut ctx);
        assert_eq!(ctx.files().len(), 1);
        assert_eq!(ctx.file("src/main.py"), Some("print('hi')\n"));
    }

    #[test]
    fn email_like_text_is_not_a_mention() {
        let (_temp, ws) = project();
        let root = ws.root().to_path_buf();
        assert!(extract_mentions("mail me@src/main.py", &root, &root).is_empty());
    }
}
