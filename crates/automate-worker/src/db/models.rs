//! Row types.

use automate_steps::StepRecord;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One row of the `"Job"` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub workflow_id: String,
    pub app: String,
    pub step_no: i32,
    #[sqlx(rename = "type")]
    pub step_type: String,
    pub data: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for StepRecord {
    fn from(row: JobRow) -> Self {
        StepRecord {
            id: row.id,
            name: row.name,
            description: row.description,
            workflow_id: row.workflow_id,
            app: row.app,
            step_no: row.step_no,
            step_type: row.step_type,
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Progress counters and status returned after appending a result.
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionProgress {
    pub job_count: i32,
    pub total_job_executed: i32,
    pub status: String,
}

impl ExecutionProgress {
    /// Every step is recorded and the row ended up `completed`, not `failed`.
    pub fn is_complete(&self) -> bool {
        self.job_count == self.total_job_executed && self.status == "completed"
    }
}
