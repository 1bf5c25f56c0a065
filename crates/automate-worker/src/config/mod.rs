//! Configuration for the execution worker.

mod database;
mod worker;

pub use database::DatabaseConfig;
pub use worker::{LogFormat, WorkerConfig};
