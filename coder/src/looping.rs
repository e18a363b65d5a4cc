//! The multi-turn agent loop.

use anyhow::{Result, anyhow};
use tracing::info;

use crate::core::context::ContextAccumulator;
use crate::core::state::{RunOutcome, TurnState};
use crate::turn::{TurnConfig, TurnDeps, TurnReport, run_turn};

/// Summary of an agent run that reached a terminal outcome without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutcome {
    pub run_id: String,
    pub turns_executed: u32,
    pub outcome: RunOutcome,
    pub last_summary: String,
    /// Accumulated context at the end of the run.
    pub context: ContextAccumulator,
}

/// Run turns until the model signals done or the budget is spent.
///
/// `ctx` seeds the first prompt (e.g. pre-loaded mentions). Model and
/// response-shape failures stop the loop immediately and are returned as
/// errors.
pub fn run_agent<F: FnMut(&TurnReport)>(
    deps: &TurnDeps<'_>,
    cfg: &TurnConfig,
    task: &str,
    mut ctx: ContextAccumulator,
    mut on_turn: F,
) -> Result<AgentOutcome> {
    let mut state = TurnState::new(cfg.max_turns);
    info!(run_id = %cfg.run_id, max_turns = cfg.max_turns, "agent started");

    while state.begin_turn().map_err(anyhow::Error::msg)? {
        let (report, next) = run_turn(deps, cfg, &mut state, task, ctx)?;
        ctx = next;
        on_turn(&report);
    }

    let outcome = state
        .outcome()
        .cloned()
        .ok_or_else(|| anyhow!("agent loop ended without an outcome"))?;
    info!(turns = state.turn(), outcome = ?outcome, "agent finished");
    Ok(AgentOutcome {
        run_id: cfg.run_id.clone(),
        turns_executed: state.turn(),
        outcome,
        last_summary: state.last_summary().to_string(),
        context: ctx,
    })
}
