//! Automate execution worker
//!
//! Executes workflow runs triggered through NATS.
//!
//! This crate provides:
//! - Run state store backed by PostgreSQL (and an in-memory one for tests)
//! - Per-run execution state machine with retry policy
//! - Execution manager bounding concurrent runs
//! - Ingress loop consuming run triggers from NATS JetStream

pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod ingress;
pub mod manager;
pub mod nats;
pub mod store;
pub mod worker;

pub use config::{DatabaseConfig, LogFormat, WorkerConfig};
pub use error::{BrokerError, StoreError};
pub use execution::{Execution, RetryPolicy, RunOutcome};
pub use ingress::{
    ChannelTriggerSource, Delivery, Disposition, IngressLoop, RunTrigger, TriggerSource,
};
pub use manager::{ExecutionManager, Occupancy};
pub use store::{AppendOutcome, MemoryRunStateStore, PgRunStateStore, RunStateStore};
pub use worker::Worker;
