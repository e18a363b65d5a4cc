//! Test doubles for the model and command collaborators, plus a scratch project.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::types::ChatMessage;
use crate::io::model::Model;
use crate::io::process::CommandRunner;
use crate::io::workspace::ProjectWorkspace;

/// Replays canned responses in order and records every request.
///
/// Once the script runs out, `generate` fails.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Queue a failing call after the responses already scripted.
    pub fn then_fail(self, message: &str) -> Self {
        self.responses
            .borrow_mut()
            .push_back(Err(message.to_string()));
        self
    }

    /// Conversations received so far, one per `generate` call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.borrow().clone()
    }

    /// User message of the `n`th call (0-indexed).
    pub fn user_message(&self, n: usize) -> Option<String> {
        self.requests
            .borrow()
            .get(n)
            .and_then(|messages| messages.last())
            .map(|m| m.content.clone())
    }
}

impl Model for ScriptedModel {
    fn generate(&self, _model: &str, messages: &[ChatMessage], _stream: bool) -> Result<String> {
        self.requests.borrow_mut().push(messages.to_vec());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted model has no more responses")),
        }
    }
}

/// Returns the same output for every command and records `(cwd, command)`.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    output: String,
    calls: RefCell<Vec<(PathBuf, String)>>,
}

impl ScriptedCommandRunner {
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for ScriptedCommandRunner {
    fn run(&self, cwd: &Path, command_line: &str) -> String {
        self.calls
            .borrow_mut()
            .push((cwd.to_path_buf(), command_line.to_string()));
        self.output.clone()
    }
}

/// A throwaway project directory with a workspace rooted at it.
pub struct TestProject {
    // Held so the directory lives as long as the project.
    _temp: tempfile::TempDir,
    workspace: ProjectWorkspace,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let workspace = ProjectWorkspace::new(temp.path())?;
        Ok(Self {
            _temp: temp,
            workspace,
        })
    }

    /// Canonical project root.
    pub fn root(&self) -> &Path {
        crate::io::workspace::Workspace::root(&self.workspace)
    }

    pub fn workspace(&self) -> &ProjectWorkspace {
        &self.workspace
    }

    pub fn write(&self, rel: &str, content: &str) -> Result<()> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        Ok(fs::read_to_string(self.root().join(rel))?)
    }
}
