//! Step execution error types.

use thiserror::Error;

/// Errors that can occur while decoding or executing a step.
#[derive(Debug, Error)]
pub enum StepError {
    /// Outbound HTTP call failed (transport, TLS, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Step configuration cannot be turned into a request.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Stored step definition is not a known step kind or has a malformed payload.
    #[error("Invalid step definition: {0}")]
    InvalidDefinition(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<reqwest::Error> for StepError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            StepError::Configuration(e.to_string())
        } else {
            StepError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::Json(e.to_string())
    }
}
