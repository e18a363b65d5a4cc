//! Turn controller state machine.
//!
//! ```text
//! Idle -> AwaitingModel -> ApplyingActions -> RunningChecks -> AwaitingModel ...
//!                 |                |                |
//!                 v                v                v
//!              Failed          Completed        Exhausted
//! ```

use serde::Serialize;

/// Where the controller currently is within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingModel,
    ApplyingActions,
    RunningChecks,
    Completed,
    Exhausted,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Exhausted | Phase::Failed)
    }

    fn can_transition_to(self, next: Phase) -> bool {
        use Phase::{
            ApplyingActions, AwaitingModel, Completed, Exhausted, Failed, Idle, RunningChecks,
        };
        matches!(
            (self, next),
            (Idle, AwaitingModel)
                | (Idle, Exhausted)
                | (AwaitingModel, ApplyingActions)
                | (AwaitingModel, Failed)
                | (ApplyingActions, RunningChecks)
                | (ApplyingActions, Completed)
                | (ApplyingActions, Failed)
                | (RunningChecks, AwaitingModel)
                | (RunningChecks, Exhausted)
                | (RunningChecks, Failed)
        )
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The model signaled `done`.
    Completed { message: String },
    /// The turn budget ran out without a `done` signal.
    Exhausted { turns: u32 },
    /// The model call failed or its response could not be interpreted.
    Failed { error: String },
}

impl RunOutcome {
    fn phase(&self) -> Phase {
        match self {
            RunOutcome::Completed { .. } => Phase::Completed,
            RunOutcome::Exhausted { .. } => Phase::Exhausted,
            RunOutcome::Failed { .. } => Phase::Failed,
        }
    }
}

/// Turn counter, previous summary and terminal outcome for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnState {
    turn: u32,
    max_turns: u32,
    phase: Phase,
    last_summary: String,
    outcome: Option<RunOutcome>,
}

impl TurnState {
    pub fn new(max_turns: u32) -> Self {
        Self {
            turn: 0,
            max_turns,
            phase: Phase::Idle,
            last_summary: String::new(),
            outcome: None,
        }
    }

    /// 1-indexed number of the current (or last) turn; 0 before the first.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_summary(&self) -> &str {
        &self.last_summary
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    /// Start the next turn, or settle on `Exhausted` when the budget is spent.
    ///
    /// Returns `false` when no further turn may run.
    pub fn begin_turn(&mut self) -> Result<bool, String> {
        if self.phase.is_terminal() {
            return Ok(false);
        }
        if self.turn >= self.max_turns {
            self.finish(RunOutcome::Exhausted { turns: self.turn })?;
            return Ok(false);
        }
        self.enter(Phase::AwaitingModel)?;
        self.turn += 1;
        Ok(true)
    }

    /// Move to a non-terminal phase.
    pub fn enter(&mut self, next: Phase) -> Result<(), String> {
        if !self.phase.can_transition_to(next) {
            return Err(format!(
                "invalid turn transition {:?} -> {:?}",
                self.phase, next
            ));
        }
        self.phase = next;
        Ok(())
    }

    pub fn record_summary(&mut self, summary: impl Into<String>) {
        self.last_summary = summary.into();
    }

    /// Settle on a terminal outcome.
    pub fn finish(&mut self, outcome: RunOutcome) -> Result<(), String> {
        self.enter(outcome.phase())?;
        self.outcome = Some(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_then_completion() {
        let mut state = TurnState::new(3);
        assert!(state.begin_turn().expect("begin"));
        assert_eq!(state.turn(), 1);
        state.enter(Phase::ApplyingActions).expect("apply");
        state.enter(Phase::RunningChecks).expect("checks");
        assert!(state.begin_turn().expect("begin"));
        assert_eq!(state.turn(), 2);
        state.enter(Phase::ApplyingActions).expect("apply");
        state
            .finish(RunOutcome::Completed {
                message: "ok".to_string(),
            })
            .expect("finish");

        assert_eq!(state.phase(), Phase::Completed);
        assert!(!state.begin_turn().expect("begin after done"));
        assert_eq!(
            state.outcome(),
            Some(&RunOutcome::Completed {
                message: "ok".to_string()
            })
        );
    }

    #[test]
    fn budget_exhaustion_is_explicit() {
        let mut state = TurnState::new(1);
        assert!(state.begin_turn().expect("begin"));
        state.enter(Phase::ApplyingActions).expect("apply");
        state.enter(Phase::RunningChecks).expect("checks");

        assert!(!state.begin_turn().expect("begin"));
        assert_eq!(state.phase(), Phase::Exhausted);
        assert_eq!(state.outcome(), Some(&RunOutcome::Exhausted { turns: 1 }));
    }

    #[test]
    fn zero_budget_exhausts_immediately() {
        let mut state = TurnState::new(0);
        assert!(!state.begin_turn().expect("begin"));
        assert_eq!(state.outcome(), Some(&RunOutcome::Exhausted { turns: 0 }));
    }

    #[test]
    fn checks_cannot_run_before_actions() {
        let mut state = TurnState::new(2);
        state.begin_turn().expect("begin");
        let err = state.enter(Phase::RunningChecks).unwrap_err();
        assert!(err.contains("AwaitingModel -> RunningChecks"));
    }
}
