//! Error types for the execution worker.

use automate_steps::StepError;
use thiserror::Error;

/// Errors raised by a run state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The referenced run does not exist
    #[error("Run not found: {0}")]
    NotFound(String),

    /// A stored step cannot be decoded
    #[error("Invalid step: {0}")]
    InvalidStep(#[from] StepError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for run state store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a trigger source.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("JetStream error: {0}")]
    JetStream(String),

    #[error("Acknowledgement error: {0}")]
    Ack(String),

    /// The source will never yield another message.
    #[error("Trigger source closed")]
    Closed,
}
