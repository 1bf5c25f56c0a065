//! Driving a run through its steps.

use automate_steps::{Step, StepExecutor};
use std::sync::Arc;
use tracing::Instrument;

use super::state::{Attempt, RetryPolicy, RunState, Transition};
use crate::store::RunStateStore;

/// Terminal outcome of an [`Execution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { steps_recorded: usize },
    Failed { reason: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// One workflow run: an immutable step snapshot executed strictly in order.
pub struct Execution {
    run_id: String,
    workflow_id: String,
    steps: Vec<Step>,
    store: Arc<dyn RunStateStore>,
    executor: Arc<dyn StepExecutor>,
    policy: RetryPolicy,
}

impl Execution {
    pub fn new(
        run_id: impl Into<String>,
        workflow_id: impl Into<String>,
        mut steps: Vec<Step>,
        store: Arc<dyn RunStateStore>,
        executor: Arc<dyn StepExecutor>,
        policy: RetryPolicy,
    ) -> Self {
        steps.sort_by_key(|s| s.step_no);

        Self {
            run_id: run_id.into(),
            workflow_id: workflow_id.into(),
            steps,
            store,
            executor,
            policy,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run to a terminal state.
    pub async fn run(self) -> RunOutcome {
        let span = tracing::info_span!(
            "execution",
            run_id = %self.run_id,
            workflow_id = %self.workflow_id,
        );
        self.drive().instrument(span).await
    }

    async fn drive(self) -> RunOutcome {
        let total = self.steps.len();
        tracing::info!(steps = total, "Run started");

        if total == 0 {
            return self.fail("Workflow has no steps".to_string()).await;
        }

        let mut state = RunState::start();
        let mut recorded = 0;

        loop {
            match state {
                RunState::Running { cursor, retries } => {
                    let Some(step) = self.steps.get(cursor) else {
                        return self
                            .fail(format!("Step cursor {} is past the last step", cursor))
                            .await;
                    };

                    let attempt = self.attempt(step, retries + 1).await;
                    if matches!(attempt, Attempt::Recorded { .. }) {
                        recorded += 1;
                    }

                    let (next, transition) = state.apply(attempt, step, total, &self.policy);
                    state = next;

                    match transition {
                        Transition::Execute | Transition::Stop => {}
                        Transition::RetryAfter(delay) => {
                            tracing::debug!(
                                step_no = step.step_no,
                                delay_ms = delay.as_millis() as u64,
                                "Retrying step after backoff"
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                RunState::Completed => {
                    tracing::info!(steps_recorded = recorded, "Run completed");
                    return RunOutcome::Completed {
                        steps_recorded: recorded,
                    };
                }
                RunState::Failed { reason } => return self.fail(reason).await,
            }
        }
    }

    async fn attempt(&self, step: &Step, attempt: u32) -> Attempt {
        let result = match self.executor.execute(step).await {
            Ok(result) if result.success => result,
            Ok(_) => {
                tracing::warn!(step_no = step.step_no, attempt, "Step reported failure");
                return Attempt::Failed {
                    error: format!("{} step reported failure", step.kind()),
                };
            }
            Err(e) => {
                tracing::warn!(step_no = step.step_no, attempt, error = %e, "Step failed");
                return Attempt::Failed {
                    error: e.to_string(),
                };
            }
        };

        match self.store.append_result(&self.run_id, &result).await {
            Ok(outcome) => {
                tracing::debug!(
                    step_no = step.step_no,
                    attempt,
                    executed = outcome.executed,
                    total = outcome.total,
                    completed = outcome.completed,
                    "Step result recorded"
                );
                Attempt::Recorded {
                    completed: outcome.completed,
                }
            }
            Err(e) => {
                tracing::warn!(
                    step_no = step.step_no,
                    attempt,
                    error = %e,
                    "Failed to record step result"
                );
                Attempt::Failed {
                    error: format!("failed to record result: {}", e),
                }
            }
        }
    }

    async fn fail(&self, reason: String) -> RunOutcome {
        tracing::error!(reason = %reason, "Run failed");

        if let Err(e) = self.store.mark_failed(&self.run_id, &reason).await {
            tracing::error!(error = %e, "Failed to mark run as failed");
        }

        RunOutcome::Failed { reason }
    }
}
