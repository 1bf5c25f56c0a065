//! In-process run state store.

use async_trait::async_trait;
use automate_steps::{Step, StepRecord, StepResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{AppendOutcome, RunStateStore};
use crate::error::StoreError;

/// Persisted status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Stored state of one run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub status: RunStatus,
    pub total_steps: i64,
    pub executed: i64,
    pub results: Vec<StepResult>,
    pub error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A call made against the store, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    LoadSteps { workflow_id: String },
    AppendResult { run_id: String, step_no: u32 },
    MarkCompleted { run_id: String },
    MarkFailed { run_id: String, reason: String },
}

impl StoreCall {
    /// Whether the call changes persisted state.
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreCall::LoadSteps { .. })
    }
}

#[derive(Default)]
struct MemoryState {
    workflows: HashMap<String, Vec<StepRecord>>,
    runs: HashMap<String, RunRecord>,
    calls: Vec<StoreCall>,
    failing_appends: usize,
    failing_loads: usize,
}

/// Run state store kept in memory. Records every call it receives.
#[derive(Default)]
pub struct MemoryRunStateStore {
    state: RwLock<MemoryState>,
}

impl MemoryRunStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the step definitions of a workflow.
    pub async fn insert_workflow(&self, workflow_id: &str, steps: &[Step]) {
        let records = steps.iter().map(Step::to_record).collect();
        self.insert_records(workflow_id, records).await;
    }

    /// Store raw step rows of a workflow, decoded on every load.
    pub async fn insert_records(&self, workflow_id: &str, records: Vec<StepRecord>) {
        let mut state = self.state.write().await;
        state.workflows.insert(workflow_id.to_string(), records);
    }

    /// Create a running run that completes after `total_steps` results.
    pub async fn create_run(&self, run_id: &str, total_steps: i64) {
        let mut state = self.state.write().await;
        state.runs.insert(
            run_id.to_string(),
            RunRecord {
                status: RunStatus::Running,
                total_steps,
                executed: 0,
                results: Vec::new(),
                error: None,
                finished_at: None,
            },
        );
    }

    pub async fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.state.read().await.runs.get(run_id).cloned()
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.read().await.calls.clone()
    }

    /// Make the next `n` `append_result` calls fail with a database error.
    pub async fn fail_next_appends(&self, n: usize) {
        self.state.write().await.failing_appends = n;
    }

    /// Make the next `n` `load_steps` calls fail with a database error.
    pub async fn fail_next_loads(&self, n: usize) {
        self.state.write().await.failing_loads = n;
    }
}

fn finish(record: &mut RunRecord, status: RunStatus) {
    if record.status == RunStatus::Running {
        record.status = status;
        record.finished_at = Some(Utc::now());
    }
}

#[async_trait]
impl RunStateStore for MemoryRunStateStore {
    async fn load_steps(&self, workflow_id: &str) -> Result<Vec<Step>, StoreError> {
        let mut state = self.state.write().await;
        state.calls.push(StoreCall::LoadSteps {
            workflow_id: workflow_id.to_string(),
        });

        if state.failing_loads > 0 {
            state.failing_loads -= 1;
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let records = state.workflows.get(workflow_id).cloned().unwrap_or_default();
        let mut steps = records
            .into_iter()
            .map(Step::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        steps.sort_by_key(|s| s.step_no);
        Ok(steps)
    }

    async fn append_result(
        &self,
        run_id: &str,
        result: &StepResult,
    ) -> Result<AppendOutcome, StoreError> {
        let mut state = self.state.write().await;
        state.calls.push(StoreCall::AppendResult {
            run_id: run_id.to_string(),
            step_no: result.step_no,
        });

        if state.failing_appends > 0 {
            state.failing_appends -= 1;
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let record = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;

        record.results.push(result.clone());
        record.executed += 1;

        if record.executed == record.total_steps {
            finish(record, RunStatus::Completed);
        }
        let completed =
            record.executed == record.total_steps && record.status == RunStatus::Completed;

        Ok(AppendOutcome {
            completed,
            executed: record.executed,
            total: record.total_steps,
        })
    }

    async fn mark_completed(&self, run_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.calls.push(StoreCall::MarkCompleted {
            run_id: run_id.to_string(),
        });

        let record = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
        finish(record, RunStatus::Completed);
        Ok(())
    }

    async fn mark_failed(&self, run_id: &str, reason: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.calls.push(StoreCall::MarkFailed {
            run_id: run_id.to_string(),
            reason: reason.to_string(),
        });

        let record = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
        if record.status == RunStatus::Running {
            record.error = Some(reason.to_string());
        }
        finish(record, RunStatus::Failed);
        Ok(())
    }
}
