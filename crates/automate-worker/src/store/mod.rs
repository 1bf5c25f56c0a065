//! Run state store.
//!
//! The store owns persisted run progress. An execution only ever reads its
//! step list once and then appends results in order; completion bookkeeping
//! happens inside [`RunStateStore::append_result`].

mod memory;
mod postgres;

pub use memory::{MemoryRunStateStore, RunRecord, RunStatus, StoreCall};
pub use postgres::PgRunStateStore;

use async_trait::async_trait;
use automate_steps::{Step, StepResult};

use crate::error::StoreError;

/// Result of appending one step result to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// The run's executed count reached its total step count and the run is
    /// now completed (a run already marked failed never reports this).
    pub completed: bool,

    /// Steps recorded so far, including this one.
    pub executed: i64,

    /// Total steps the run was created with.
    pub total: i64,
}

/// Persisted per-run progress shared by all concurrent executions.
///
/// Implementations must be safe to call concurrently for different runs.
#[async_trait]
pub trait RunStateStore: Send + Sync {
    /// Steps of a workflow sorted by ascending `step_no`; empty if none.
    async fn load_steps(&self, workflow_id: &str) -> Result<Vec<Step>, StoreError>;

    /// Atomically append `result`, bump the executed count and, when it reaches
    /// the run's total, mark the run completed.
    async fn append_result(
        &self,
        run_id: &str,
        result: &StepResult,
    ) -> Result<AppendOutcome, StoreError>;

    /// Mark a run completed. Idempotent.
    async fn mark_completed(&self, run_id: &str) -> Result<(), StoreError>;

    /// Mark a run failed with `reason`. Idempotent.
    async fn mark_failed(&self, run_id: &str, reason: &str) -> Result<(), StoreError>;
}
