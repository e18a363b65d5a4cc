//! Shared deterministic types for the agent core.
//!
//! These types define stable contracts between the parser, the patch engine and
//! the turn controller. They carry no I/O handles and must stay deterministic.

use serde::{Deserialize, Serialize};

/// Full-file create/overwrite requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFile {
    pub path: String,
    pub content: String,
}

/// Fuzzy search/replace requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditFile {
    pub path: String,
    pub old: String,
    pub new: String,
    pub replace_all: bool,
}

/// Read-only query the model issues before acting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextRequest {
    ReadFile { path: String },
    Grep { pattern: String, path: String },
    ListDir { path: String },
    ApiOverview { header: String },
}

/// One action recognized in a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    WriteFile(WriteFile),
    EditFile(EditFile),
    ContextRequest(ContextRequest),
    Done { message: String },
}

/// Outcome of the strict pass over the control vocabulary (`need_context`, `done`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlParse {
    Parsed,
    /// The sanitized markup was not well-formed; no control actions were read.
    Malformed { reason: String },
}

impl ControlParse {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ControlParse::Parsed)
    }
}

/// Structured actions extracted from one model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub write_files: Vec<WriteFile>,
    pub edit_files: Vec<EditFile>,
    pub context_requests: Vec<ContextRequest>,
    pub done: bool,
    pub done_message: String,
    pub control: ControlParse,
}

impl Default for ParsedOutput {
    fn default() -> Self {
        Self {
            write_files: Vec::new(),
            edit_files: Vec::new(),
            context_requests: Vec::new(),
            done: false,
            done_message: String::new(),
            control: ControlParse::Parsed,
        }
    }
}

impl ParsedOutput {
    /// Flatten into application order: requests, writes, edits, then `Done`.
    pub fn actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .context_requests
            .iter()
            .cloned()
            .map(Action::ContextRequest)
            .collect();
        actions.extend(self.write_files.iter().cloned().map(Action::WriteFile));
        actions.extend(self.edit_files.iter().cloned().map(Action::EditFile));
        if self.done {
            actions.push(Action::Done {
                message: self.done_message.clone(),
            });
        }
        actions
    }
}

/// Role of a chat message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the outbound conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One directory entry returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// One line matched by a project search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// Path relative to the project root.
    pub file: String,
    /// 1-indexed line number.
    pub line: usize,
    /// Matched line with surrounding whitespace trimmed.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_follow_application_order() {
        let parsed = ParsedOutput {
            write_files: vec![WriteFile {
                path: "a.txt".to_string(),
                content: "a".to_string(),
            }],
            edit_files: vec![EditFile {
                path: "b.txt".to_string(),
                old: "x".to_string(),
                new: "y".to_string(),
                replace_all: false,
            }],
            context_requests: vec![ContextRequest::ListDir {
                path: ".".to_string(),
            }],
            done: true,
            done_message: "ok".to_string(),
            control: ControlParse::Parsed,
        };

        let kinds: Vec<&str> = parsed
            .actions()
            .iter()
            .map(|action| match action {
                Action::ContextRequest(_) => "request",
                Action::WriteFile(_) => "write",
                Action::EditFile(_) => "edit",
                Action::Done { .. } => "done",
            })
            .collect();
        assert_eq!(kinds, vec!["request", "write", "edit", "done"]);
    }
}
