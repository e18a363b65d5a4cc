//! Filesystem access scoped to the project root.
//!
//! Every path the model names is resolved against the root and rejected with
//! [`FsError::PathOutsideProject`] if it escapes, either lexically (`..`) or
//! through a symlink.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::types::{DirEntry, GrepMatch};

/// Directories never descended into by searches.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
];
const MAX_GREP_MATCHES: usize = 1_000;
const MAX_OVERVIEW_LINES: usize = 400;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("path outside project: {0}")]
    PathOutsideProject(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    fn io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::NotFound {
            return FsError::NotFound(path.to_string());
        }
        FsError::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// Filesystem operations the turn controller needs.
pub trait Workspace {
    /// Absolute project root.
    fn root(&self) -> &Path;
    fn exists(&self, path: &str) -> Result<bool, FsError>;
    fn read_file(&self, path: &str) -> Result<String, FsError>;
    /// Create or overwrite a file, creating parent directories as needed.
    fn write_file(&self, path: &str, content: &str) -> Result<(), FsError>;
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;
    fn grep(&self, pattern: &str, path: &str) -> Result<Vec<GrepMatch>, FsError>;
    /// Declaration-only overview of a header file.
    fn api_overview(&self, header: &str) -> Result<String, FsError>;
}

/// [`Workspace`] backed by the real filesystem.
#[derive(Debug, Clone)]
pub struct ProjectWorkspace {
    root: PathBuf,
    headers_dir: Option<PathBuf>,
}

impl ProjectWorkspace {
    /// Open a workspace rooted at `root`, which must be an existing directory.
    pub fn new(root: &Path) -> Result<Self, FsError> {
        let display = root.display().to_string();
        let root = root.canonicalize().map_err(|e| FsError::io(&display, e))?;
        if !root.is_dir() {
            return Err(FsError::Io {
                path: display,
                source: std::io::Error::new(ErrorKind::InvalidInput, "not a directory"),
            });
        }
        Ok(Self {
            root,
            headers_dir: None,
        })
    }

    /// Search `dir` instead of the project root for `api_overview` headers.
    pub fn with_headers_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.headers_dir = dir;
        self
    }

    /// Resolve a model-supplied path to an absolute path inside the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let requested = Path::new(path.trim());
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };
        let normalized = normalize_lexically(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(FsError::PathOutsideProject(path.to_string()));
        }
        // Symlinks: the deepest existing ancestor must still live under the root.
        if let Some(existing) = normalized.ancestors().find(|p| p.exists()) {
            let real = existing.canonicalize().map_err(|e| FsError::io(path, e))?;
            if !real.starts_with(&self.root) {
                return Err(FsError::PathOutsideProject(path.to_string()));
            }
        }
        Ok(normalized)
    }

    /// Path relative to the root, `/`-separated, for display and prompts.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let joined = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if joined.is_empty() {
            ".".to_string()
        } else {
            joined
        }
    }
}

impl Workspace for ProjectWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, path: &str) -> Result<bool, FsError> {
        Ok(self.resolve(path)?.is_file())
    }

    fn read_file(&self, path: &str) -> Result<String, FsError> {
        let full = self.resolve(path)?;
        fs::read_to_string(&full).map_err(|e| FsError::io(path, e))
    }

    #[instrument(skip_all, fields(path = %path, bytes = content.len()))]
    fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        write_atomic(&full, content).map_err(|e| FsError::io(path, e))?;
        debug!("file written");
        Ok(())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let dir = self.resolve(path)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| FsError::io(path, e))? {
            let entry = entry.map_err(|e| FsError::io(path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            entries.push(DirEntry {
                is_dir: entry.path().is_dir(),
                name,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    #[instrument(skip_all, fields(pattern = %pattern, path = %path))]
    fn grep(&self, pattern: &str, path: &str) -> Result<Vec<GrepMatch>, FsError> {
        let base = self.resolve(path)?;
        if !base.exists() {
            return Ok(Vec::new());
        }
        let regex = Regex::new(pattern).or_else(|err| {
            debug!(err = %err, "invalid regex, searching literally");
            Regex::new(&regex::escape(pattern))
        });
        let Ok(regex) = regex else {
            return Ok(Vec::new());
        };

        let mut matches = Vec::new();
        for file in walk_files(&base) {
            let Ok(bytes) = fs::read(&file) else {
                continue;
            };
            if bytes.contains(&0) {
                continue;
            }
            let text = String::from_utf8_lossy(&bytes);
            let rel = self.relative(&file);
            for (idx, line) in text.split('\n').enumerate() {
                if regex.is_match(line) {
                    matches.push(GrepMatch {
                        file: rel.clone(),
                        line: idx + 1,
                        text: line.trim().to_string(),
                    });
                    if matches.len() >= MAX_GREP_MATCHES {
                        warn!(limit = MAX_GREP_MATCHES, "grep match limit reached");
                        return Ok(matches);
                    }
                }
            }
        }
        debug!(count = matches.len(), "grep finished");
        Ok(matches)
    }

    fn api_overview(&self, header: &str) -> Result<String, FsError> {
        let search_root = self.headers_dir.as_deref().unwrap_or(&self.root);
        let wanted = Path::new(header.trim());
        let Some(found) = walk_files(search_root).find(|p| p.ends_with(wanted)) else {
            return Ok(format!("(header {header} not found)"));
        };
        let text = fs::read_to_string(&found).map_err(|e| FsError::io(header, e))?;
        let display = found
            .strip_prefix(search_root)
            .unwrap_or(&found)
            .display()
            .to_string();
        Ok(render_overview(&display, &text))
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Regular files under `base` (or `base` itself), skipping hidden entries and
/// build/VCS directories, in a stable order.
fn walk_files(base: &Path) -> impl Iterator<Item = PathBuf> + use<> {
    WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_ref())
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
}

/// Keep only top-level declarations of a C-style header.
fn render_overview(display: &str, text: &str) -> String {
    let mut lines = vec![format!("// API overview of {display}")];
    let mut depth: i32 = 0;
    let mut pending: Option<String> = None;
    let mut in_comment = false;

    for raw in text.lines() {
        let line = raw.trim();
        if in_comment {
            in_comment = !line.contains("*/");
            continue;
        }
        if line.starts_with("/*") {
            in_comment = !line.contains("*/");
            continue;
        }
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if depth == 0 {
            if let Some(mut decl) = pending.take() {
                decl.push(' ');
                decl.push_str(line);
                if line.ends_with(';') {
                    lines.push(decl);
                } else if !line.contains('{') {
                    pending = Some(decl);
                }
            } else if is_declaration_head(line) {
                lines.push(line.to_string());
            } else if line.contains('(') && !line.starts_with('#') {
                if line.ends_with(';') {
                    lines.push(line.to_string());
                } else if !line.contains('{') {
                    pending = Some(line.to_string());
                }
            }
        } else if depth == 1 && line.starts_with('}') && line.ends_with(';') {
            lines.push(line.to_string());
        }

        depth += line.matches('{').count() as i32;
        depth -= line.matches('}').count() as i32;
        depth = depth.max(0);

        if lines.len() > MAX_OVERVIEW_LINES {
            lines.push("// ... overview truncated".to_string());
            break;
        }
    }
    lines.join("\n")
}

fn is_declaration_head(line: &str) -> bool {
    ["#define", "typedef", "struct ", "enum ", "union ", "extern "]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Write via temp file + rename so readers never observe a partial file.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.coder.tmp"));
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}
