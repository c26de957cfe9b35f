//! The per-pass loop state machine.
//!
//! ```text
//! Idle ──start──▶ Running ──after_turn──▶ Running | Completed | LimitReached
//!                    └──────abort──────▶ Aborted
//! ```
//!
//! The controller raises no errors; it reads the outcome of each turn and
//! decides whether another request may be sent.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Running,
    Completed,
    Aborted,
    LimitReached,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::LimitReached)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopState {
    pub iteration: u32,
    /// `None` means unbounded.
    pub max_iterations: Option<u32>,
    pub task_completed: bool,
    pub is_active: bool,
    pub is_aborted: bool,
}

/// What happened in one turn, as far as the controller cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    pub executed_tool_calls: usize,
    pub has_text: bool,
    /// Set only when `task_complete` ran.
    pub task_completed: bool,
}

#[derive(Debug, Clone)]
pub struct LoopController {
    state: LoopState,
    phase: LoopPhase,
}

impl LoopController {
    pub fn new(max_iterations: Option<u32>) -> Self {
        Self {
            state: LoopState {
                iteration: 0,
                max_iterations,
                task_completed: false,
                is_active: false,
                is_aborted: false,
            },
            phase: LoopPhase::Idle,
        }
    }

    pub fn start(&mut self) {
        if self.phase == LoopPhase::Idle {
            self.phase = LoopPhase::Running;
            self.state.is_active = true;
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn iteration(&self) -> u32 {
        self.state.iteration
    }

    fn at_ceiling(&self) -> bool {
        self.state
            .max_iterations
            .is_some_and(|max| self.state.iteration >= max)
    }

    /// Count one more logical request. Retried attempts of the same request
    /// are not counted. Returns the new iteration, or `None` when no request
    /// may be sent.
    pub fn begin_request(&mut self) -> Option<u32> {
        if self.phase != LoopPhase::Running || self.state.task_completed || self.at_ceiling() {
            return None;
        }
        self.state.iteration += 1;
        Some(self.state.iteration)
    }

    /// Apply the transition for a finished turn and return the new phase.
    pub fn after_turn(&mut self, outcome: TurnOutcome) -> LoopPhase {
        if self.phase != LoopPhase::Running {
            return self.phase;
        }

        self.phase = if outcome.task_completed {
            self.state.task_completed = true;
            LoopPhase::Completed
        } else if outcome.executed_tool_calls == 0 {
            // The assistant finished talking without asking for anything else.
            LoopPhase::Completed
        } else if self.at_ceiling() {
            LoopPhase::LimitReached
        } else {
            LoopPhase::Running
        };

        if self.phase.is_terminal() {
            self.state.is_active = false;
        }
        self.phase
    }

    /// Cancellation observed. A no-op once the pass has already ended.
    pub fn abort(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = LoopPhase::Aborted;
            self.state.is_aborted = true;
            self.state.is_active = false;
        }
    }
}
