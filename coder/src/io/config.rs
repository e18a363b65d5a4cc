//! Agent configuration loaded from `coder.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Agent configuration (TOML).
///
/// Missing fields default to values suitable for a local OpenAI-compatible
/// server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub model: ModelConfig,

    /// Project directory the agent may read and write. Relative paths resolve
    /// against the current directory.
    pub project_root: PathBuf,

    /// Where `api_overview` requests look for headers. Relative to the config file.
    pub api_headers_dir: Option<PathBuf>,

    /// Upper bound on model round-trips per run.
    pub max_turns: u32,

    /// Wall-clock budget for each lint/compile command.
    pub command_timeout_secs: u64,

    /// Truncate lint/compile stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Directory for run logs and verbose transcripts.
    pub log_dir: PathBuf,

    /// Overrides the built-in system prompt. Relative to the config file.
    pub system_prompt_path: PathBuf,

    pub lint: CheckConfig,
    pub compile: CheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    /// Base URL of an OpenAI-compatible API, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub api_key: String,
    /// Environment variable that, when set, takes precedence over `api_key`.
    pub api_key_env: Option<String>,
    pub stream: bool,
    pub request_timeout_secs: u64,
}

/// An optional external check run after every non-final turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckConfig {
    pub enabled: bool,
    /// Shell command line, run through `sh -c`.
    pub command: String,
    /// Working directory relative to the project root.
    pub cwd: PathBuf,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: String::new(),
            cwd: PathBuf::from("."),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: "ollama".to_string(),
            api_key_env: None,
            stream: true,
            request_timeout_secs: 300,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            project_root: PathBuf::from("."),
            api_headers_dir: None,
            max_turns: 10,
            command_timeout_secs: 60,
            output_limit_bytes: 100_000,
            log_dir: PathBuf::from(".coder/logs"),
            system_prompt_path: PathBuf::from("system.md"),
            lint: CheckConfig::default(),
            compile: CheckConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_turns == 0 {
            return Err(anyhow!("max_turns must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.model.name.trim().is_empty() {
            return Err(anyhow!("model.name must be non-empty"));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(anyhow!("model.base_url must be non-empty"));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        for (name, check) in [("lint", &self.lint), ("compile", &self.compile)] {
            if check.enabled && check.command.trim().is_empty() {
                return Err(anyhow!("{name}.command must be non-empty when enabled"));
            }
        }
        Ok(())
    }

    /// Absolute project root, resolved against `cwd` when relative.
    pub fn resolve_project_root(&self, cwd: &Path) -> PathBuf {
        resolve_against(cwd, &self.project_root)
    }

    /// Absolute headers directory, or `None` when unset or missing on disk.
    pub fn resolve_headers_dir(&self, config_dir: &Path) -> Option<PathBuf> {
        let dir = resolve_against(config_dir, self.api_headers_dir.as_deref()?);
        dir.is_dir().then_some(dir)
    }

    /// Contents of the system prompt override, if the file exists.
    pub fn load_system_prompt(&self, config_dir: &Path) -> Result<Option<String>> {
        let path = resolve_against(config_dir, &self.system_prompt_path);
        if !path.is_file() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(text))
    }
}

impl ModelConfig {
    /// API key, preferring the configured environment variable when it is set.
    pub fn resolve_api_key(&self) -> String {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| self.api_key.clone())
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
