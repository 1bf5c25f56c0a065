//! Run state queries.
//!
//! Identifier columns are compared as text so the queries work whether the
//! API stores ids as `text` or `uuid`; enum-typed columns are read as text.

use crate::db::models::{ExecutionProgress, JobRow};
use crate::db::DbPool;
use crate::error::StoreResult;

/// All steps of a workflow, in execution order.
pub async fn select_jobs_by_workflow(pool: &DbPool, workflow_id: &str) -> StoreResult<Vec<JobRow>> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id::text AS id, name, description, workflow_id::text AS workflow_id,
               app::text AS app, step_no, type::text AS type, data,
               created_at::timestamptz AS created_at, updated_at::timestamptz AS updated_at
        FROM "Job"
        WHERE workflow_id::text = $1
        ORDER BY step_no ASC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Append one result and bump the executed counters. The row is marked
/// completed by the same statement once the executed count reaches the job
/// count, unless it already failed.
///
/// Returns `None` if the run does not exist.
pub async fn append_execution_result(
    pool: &DbPool,
    execution_id: &str,
    result: &serde_json::Value,
) -> StoreResult<Option<ExecutionProgress>> {
    let progress = sqlx::query_as::<_, ExecutionProgress>(
        r#"
        UPDATE "Execution"
        SET results = COALESCE(results, ARRAY[]::jsonb[]) || ARRAY[$1::jsonb],
            job_index = job_index + 1,
            total_job_executed = total_job_executed + 1,
            status = CASE
                WHEN total_job_executed + 1 = job_count AND status::text <> 'failed'
                    THEN 'completed'
                ELSE status
            END,
            finished_at = CASE
                WHEN total_job_executed + 1 = job_count THEN COALESCE(finished_at, NOW())
                ELSE finished_at
            END
        WHERE id::text = $2
        RETURNING job_count, total_job_executed, status::text AS status
        "#,
    )
    .bind(result)
    .bind(execution_id)
    .fetch_optional(pool)
    .await?;

    Ok(progress)
}

/// Mark a run completed unless it already failed.
///
/// Returns `false` when no row changed (missing, or already failed).
pub async fn complete_execution(pool: &DbPool, execution_id: &str) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE "Execution"
        SET status = 'completed',
            finished_at = COALESCE(finished_at, NOW())
        WHERE id::text = $1 AND status::text <> 'failed'
        "#,
    )
    .bind(execution_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a run failed unless it already completed.
///
/// Returns `false` when no row changed (missing, or already completed).
pub async fn fail_execution(pool: &DbPool, execution_id: &str, error: &str) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE "Execution"
        SET status = 'failed',
            finished_at = COALESCE(finished_at, NOW()),
            error = COALESCE(error, $2)
        WHERE id::text = $1 AND status::text <> 'completed'
        "#,
    )
    .bind(execution_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether a run row exists.
pub async fn execution_exists(pool: &DbPool, execution_id: &str) -> StoreResult<bool> {
    let row: Option<(i32,)> = sqlx::query_as(r#"SELECT 1 FROM "Execution" WHERE id::text = $1"#)
        .bind(execution_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}
