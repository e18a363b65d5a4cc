//! Per-turn transcripts under `<log_dir>/<run_id>/turn-<n>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{ChatMessage, Role};

#[derive(Debug, Clone, Serialize)]
pub struct TurnMeta {
    pub run_id: String,
    pub turn: u32,
    pub summary: String,
    pub done: bool,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TurnPaths {
    pub dir: PathBuf,
    pub request_path: PathBuf,
    pub response_path: PathBuf,
    pub meta_path: PathBuf,
}

impl TurnPaths {
    pub fn new(transcript_dir: &Path, turn: u32) -> Self {
        let dir = transcript_dir.join(format!("turn-{turn}"));
        Self {
            request_path: dir.join("request.md"),
            response_path: dir.join("response.md"),
            meta_path: dir.join("meta.json"),
            dir,
        }
    }
}

/// Writes human-readable request/response files for each turn.
#[derive(Debug, Clone)]
pub struct Transcript {
    dir: PathBuf,
}

impl Transcript {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write_request(&self, turn: u32, messages: &[ChatMessage]) -> Result<PathBuf> {
        let paths = self.prepare(turn)?;
        let mut buf = String::new();
        for message in messages {
            let label = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            buf.push_str(&format!("--- {label} ---\n{}\n\n", message.content.trim_end()));
        }
        write_text(&paths.request_path, &buf)?;
        Ok(paths.request_path)
    }

    pub fn write_response(&self, turn: u32, raw: &str) -> Result<PathBuf> {
        let paths = self.prepare(turn)?;
        write_text(&paths.response_path, raw)?;
        Ok(paths.response_path)
    }

    pub fn write_meta(&self, meta: &TurnMeta) -> Result<PathBuf> {
        let paths = self.prepare(meta.turn)?;
        let mut buf = serde_json::to_string_pretty(meta).context("serialize turn meta")?;
        buf.push('\n');
        write_text(&paths.meta_path, &buf)?;
        Ok(paths.meta_path)
    }

    fn prepare(&self, turn: u32) -> Result<TurnPaths> {
        let paths = TurnPaths::new(&self.dir, turn);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create turn dir {}", paths.dir.display()))?;
        Ok(paths)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
