//! PostgreSQL run state store.

use async_trait::async_trait;
use automate_steps::{Step, StepRecord, StepResult};

use super::{AppendOutcome, RunStateStore};
use crate::db::{queries, DbPool};
use crate::error::StoreError;

/// Run state store over the workflow API's database.
#[derive(Clone)]
pub struct PgRunStateStore {
    pool: DbPool,
}

impl PgRunStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Distinguish "nothing to change" from "no such run" after a guarded update.
    async fn ensure_exists(&self, run_id: &str) -> Result<(), StoreError> {
        if queries::execution_exists(&self.pool, run_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(run_id.to_string()))
        }
    }
}

#[async_trait]
impl RunStateStore for PgRunStateStore {
    async fn load_steps(&self, workflow_id: &str) -> Result<Vec<Step>, StoreError> {
        let rows = queries::select_jobs_by_workflow(&self.pool, workflow_id).await?;

        let steps = rows
            .into_iter()
            .map(|row| Step::from_record(StepRecord::from(row)))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(workflow_id, steps = steps.len(), "Loaded workflow steps");
        Ok(steps)
    }

    async fn append_result(
        &self,
        run_id: &str,
        result: &StepResult,
    ) -> Result<AppendOutcome, StoreError> {
        let payload = serde_json::to_value(result)?;

        let progress = queries::append_execution_result(&self.pool, run_id, &payload)
            .await?
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;

        let completed = progress.is_complete();

        tracing::debug!(
            run_id,
            step_no = result.step_no,
            executed = progress.total_job_executed,
            total = progress.job_count,
            completed,
            "Step result recorded"
        );

        Ok(AppendOutcome {
            completed,
            executed: i64::from(progress.total_job_executed),
            total: i64::from(progress.job_count),
        })
    }

    async fn mark_completed(&self, run_id: &str) -> Result<(), StoreError> {
        if !queries::complete_execution(&self.pool, run_id).await? {
            self.ensure_exists(run_id).await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, run_id: &str, reason: &str) -> Result<(), StoreError> {
        if !queries::fail_execution(&self.pool, run_id, reason).await? {
            self.ensure_exists(run_id).await?;
        }
        Ok(())
    }
}
