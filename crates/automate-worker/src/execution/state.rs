//! Run state machine.

use automate_steps::Step;
use std::time::Duration;

/// Default attempts per step.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts of the same step.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Per-step retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first.
    pub max_attempts: u32,

    /// Fixed delay before re-attempting a failed step.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

/// Outcome of one attempt at the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// The step succeeded and its result was appended.
    Recorded { completed: bool },

    /// The step errored, reported failure, or its result could not be recorded.
    Failed { error: String },
}

/// What the driver does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Execute the step under the cursor now.
    Execute,

    /// Execute the same step again after the delay.
    RetryAfter(Duration),

    /// The run is terminal.
    Stop,
}

/// State of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// `cursor` indexes the step being attempted; `retries` counts its failed attempts.
    Running { cursor: usize, retries: u32 },
    Completed,
    Failed { reason: String },
}

impl RunState {
    pub fn start() -> Self {
        RunState::Running {
            cursor: 0,
            retries: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running { .. })
    }

    /// Apply the outcome of an attempt at `step`, the step under the cursor of a
    /// run of `total_steps` steps. Terminal states absorb every attempt.
    pub fn apply(
        self,
        attempt: Attempt,
        step: &Step,
        total_steps: usize,
        policy: &RetryPolicy,
    ) -> (RunState, Transition) {
        let (cursor, retries) = match self {
            RunState::Running { cursor, retries } => (cursor, retries),
            terminal => return (terminal, Transition::Stop),
        };

        match attempt {
            Attempt::Recorded { completed: true } => (RunState::Completed, Transition::Stop),
            Attempt::Recorded { completed: false } => {
                let next = cursor + 1;
                if next >= total_steps {
                    let reason = format!(
                        "All {} steps were recorded but the run was not marked complete",
                        total_steps
                    );
                    return (RunState::Failed { reason }, Transition::Stop);
                }
                (
                    RunState::Running {
                        cursor: next,
                        retries: 0,
                    },
                    Transition::Execute,
                )
            }
            Attempt::Failed { error } => {
                let retries = retries + 1;
                if retries >= policy.max_attempts {
                    let reason = format!(
                        "Step {} ({}) failed after {} attempts: {}",
                        step.step_no,
                        step.kind(),
                        retries,
                        error
                    );
                    return (RunState::Failed { reason }, Transition::Stop);
                }
                (
                    RunState::Running { cursor, retries },
                    Transition::RetryAfter(policy.backoff),
                )
            }
        }
    }
}
