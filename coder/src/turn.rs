//! Orchestration for a single turn: prompt, model call, parse, apply, check.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::context::ContextAccumulator;
use crate::core::parser::parse;
use crate::core::patch::create_or_edit;
use crate::core::state::{Phase, RunOutcome, TurnState};
use crate::core::summary::{TurnEffects, build_turn_summary};
use crate::core::types::{ControlParse, EditFile, WriteFile};
use crate::io::config::{AgentConfig, CheckConfig};
use crate::io::context::fulfill_requests;
use crate::io::model::Model;
use crate::io::process::CommandRunner;
use crate::io::prompt::PromptBuilder;
use crate::io::transcript::{Transcript, TurnMeta};
use crate::io::workspace::{FsError, Workspace};

/// Collaborators a turn talks to.
pub struct TurnDeps<'a> {
    pub model: &'a dyn Model,
    pub workspace: &'a dyn Workspace,
    pub commands: &'a dyn CommandRunner,
    pub prompts: &'a PromptBuilder,
    /// Written only when set (`--verbose`).
    pub transcript: Option<&'a Transcript>,
}

/// An enabled lint or compile command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub command: String,
    /// Relative to the project root.
    pub cwd: PathBuf,
}

impl Check {
    fn from_config(cfg: &CheckConfig) -> Option<Self> {
        cfg.enabled.then(|| Self {
            command: cfg.command.clone(),
            cwd: cfg.cwd.clone(),
        })
    }
}

/// Per-run settings the controller needs.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub run_id: String,
    pub model: String,
    pub stream: bool,
    pub max_turns: u32,
    pub lint: Option<Check>,
    pub compile: Option<Check>,
}

impl TurnConfig {
    pub fn from_agent_config(cfg: &AgentConfig, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            model: cfg.model.name.clone(),
            stream: cfg.model.stream,
            max_turns: cfg.max_turns,
            lint: Check::from_config(&cfg.lint),
            compile: Check::from_config(&cfg.compile),
        }
    }
}

/// What one turn did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// 1-indexed turn number.
    pub turn: u32,
    pub effects: TurnEffects,
    pub summary: String,
    /// Set when the model signalled completion.
    pub done_message: Option<String>,
    pub control: ControlParse,
    pub duration_ms: u64,
}

/// Run one turn. The caller must already have started it with
/// [`TurnState::begin_turn`].
///
/// Model and response-shape failures settle `state` on `Failed` and are
/// returned as errors; file operation failures are recorded in the returned
/// accumulator and the turn summary.
#[instrument(skip_all, fields(turn = state.turn()))]
pub fn run_turn(
    deps: &TurnDeps<'_>,
    cfg: &TurnConfig,
    state: &mut TurnState,
    task: &str,
    mut ctx: ContextAccumulator,
) -> Result<(TurnReport, ContextAccumulator)> {
    if state.phase() != Phase::AwaitingModel {
        return Err(anyhow!(
            "turn started in phase {:?}; call begin_turn first",
            state.phase()
        ));
    }
    let turn = state.turn();
    let started_at = chrono::Local::now();
    let start = Instant::now();
    info!(turn, max_turns = state.max_turns(), "turn started");

    let messages = deps
        .prompts
        .build_messages(task, state.last_summary(), &ctx)?;
    if let Some(transcript) = deps.transcript {
        transcript.write_request(turn, &messages)?;
    }

    let raw = match deps.model.generate(&cfg.model, &messages, cfg.stream) {
        Ok(raw) => raw,
        Err(err) => {
            let err = err.context(format!("model call failed on turn {turn}"));
            fail(state, &err)?;
            return Err(err);
        }
    };
    if let Some(transcript) = deps.transcript {
        transcript.write_response(turn, &raw)?;
    }

    let parsed = match parse(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            let err = anyhow::Error::new(err).context(format!("parse response on turn {turn}"));
            fail(state, &err)?;
            return Err(err);
        }
    };
    debug!(
        writes = parsed.write_files.len(),
        edits = parsed.edit_files.len(),
        requests = parsed.context_requests.len(),
        done = parsed.done,
        "response parsed"
    );
    if let ControlParse::Malformed { reason } = &parsed.control {
        warn!(reason = %reason, "control markup malformed; only file blocks applied");
    }

    state.enter(Phase::ApplyingActions).map_err(anyhow::Error::msg)?;
    fulfill_requests(deps.workspace, &mut ctx, &parsed.context_requests);

    ctx.clear_edit_failures();
    let mut effects = TurnEffects {
        done: parsed.done,
        ..TurnEffects::default()
    };
    for write in &parsed.write_files {
        if apply_write(deps.workspace, &mut ctx, write) {
            effects.written.push(write.path.clone());
        }
    }
    for edit in &parsed.edit_files {
        if apply_edit(deps.workspace, &mut ctx, edit) {
            effects.edited.push(edit.path.clone());
        }
    }
    effects.failures = ctx.edit_failures().to_vec();

    let done_message = parsed.done.then(|| parsed.done_message.clone());
    if let Some(message) = &done_message {
        info!(message = %message, "model signalled done");
    } else {
        state.enter(Phase::RunningChecks).map_err(anyhow::Error::msg)?;
        if let Some(check) = &cfg.lint {
            let output = run_check(deps, check, "lint");
            ctx.set_lint(output.as_str());
            effects.lint = Some(output);
        }
        if let Some(check) = &cfg.compile {
            let output = run_check(deps, check, "compile");
            ctx.set_compile(output.as_str());
            effects.compile = Some(output);
        }
    }

    let summary = build_turn_summary(&effects);
    info!(summary = %summary, "turn finished");
    state.record_summary(summary.as_str());
    if let Some(message) = &done_message {
        state
            .finish(RunOutcome::Completed {
                message: message.clone(),
            })
            .map_err(anyhow::Error::msg)?;
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    if let Some(transcript) = deps.transcript {
        transcript.write_meta(&TurnMeta {
            run_id: cfg.run_id.clone(),
            turn,
            summary: summary.clone(),
            done: parsed.done,
            started_at: started_at.to_rfc3339(),
            ended_at: chrono::Local::now().to_rfc3339(),
            duration_ms,
        })?;
    }

    Ok((
        TurnReport {
            turn,
            effects,
            summary,
            done_message,
            control: parsed.control,
            duration_ms,
        },
        ctx,
    ))
}

fn fail(state: &mut TurnState, err: &anyhow::Error) -> Result<()> {
    state
        .finish(RunOutcome::Failed {
            error: format!("{err:#}"),
        })
        .map_err(anyhow::Error::msg)
        .context("record failed turn")
}

fn apply_write(workspace: &dyn Workspace, ctx: &mut ContextAccumulator, write: &WriteFile) -> bool {
    match workspace.write_file(&write.path, &write.content) {
        Ok(()) => {
            info!(path = %write.path, bytes = write.content.len(), "wrote file");
            ctx.add_file(write.path.as_str(), write.content.as_str());
            true
        }
        Err(err) => {
            warn!(path = %write.path, err = %err, "write failed");
            ctx.add_edit_failure(write.path.as_str(), err.to_string());
            false
        }
    }
}

fn apply_edit(workspace: &dyn Workspace, ctx: &mut ContextAccumulator, edit: &EditFile) -> bool {
    match edit_on_disk(workspace, edit) {
        Ok(()) => {
            info!(path = %edit.path, replace_all = edit.replace_all, "edited file");
            match workspace.read_file(&edit.path) {
                Ok(content) => ctx.add_file(edit.path.as_str(), content),
                Err(err) => debug!(path = %edit.path, err = %err, "re-read after edit failed"),
            }
            true
        }
        Err(reason) => {
            warn!(path = %edit.path, reason = %reason, "edit failed");
            ctx.add_edit_failure(edit.path.as_str(), reason);
            false
        }
    }
}

/// Read, patch and rewrite one file. The error is the failure reason shown
/// to the model.
fn edit_on_disk(workspace: &dyn Workspace, edit: &EditFile) -> Result<(), String> {
    let existing = if workspace.exists(&edit.path).map_err(fs_reason)? {
        Some(workspace.read_file(&edit.path).map_err(fs_reason)?)
    } else {
        None
    };
    let updated = create_or_edit(existing.as_deref(), &edit.old, &edit.new, edit.replace_all)
        .map_err(|err| err.to_string())?;
    workspace
        .write_file(&edit.path, &updated)
        .map_err(fs_reason)
}

fn fs_reason(err: FsError) -> String {
    err.to_string()
}

fn run_check(deps: &TurnDeps<'_>, check: &Check, label: &str) -> String {
    let cwd = deps.workspace.root().join(&check.cwd);
    let output = deps.commands.run(&cwd, &check.command);
    debug!(check = label, bytes = output.len(), "check finished");
    output
}
