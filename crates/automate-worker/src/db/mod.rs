//! Database access for the PostgreSQL run state store.
//!
//! Tables are owned by the workflow API: `"Job"` holds step definitions and
//! `"Execution"` holds per-run progress. The worker only reads steps and updates
//! run rows.

pub mod models;
pub mod pool;
pub mod queries;

pub use pool::{create_pool, health_check, DbPool};
