//! Step execution result types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::step::{Step, StepKind};

/// Acknowledgment recorded for a webhook trigger step.
pub const WEBHOOK_ACK: &str = "Webhook got triggered successfully.";

/// Acknowledgment recorded for a schedule trigger step.
pub const SCHEDULE_ACK: &str = "workflow got triggered successfully.";

/// Raw response of an HTTP step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Provider acknowledgment of an email step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub success: bool,
}

/// Kind-specific result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepOutput {
    Http(HttpResponse),
    Email(EmailReceipt),
    Acknowledged(String),
}

/// Outcome of executing one step, in the shape appended to a run's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_no: u32,
    pub key: StepKind,
    pub success: bool,
    pub result: StepOutput,
}

impl StepResult {
    /// Create a successful result for `step`.
    pub fn succeeded(step: &Step, result: StepOutput) -> Self {
        Self {
            step_no: step.step_no,
            key: step.kind(),
            success: true,
            result,
        }
    }

    /// Create an unsuccessful result for `step`.
    pub fn failed(step: &Step, result: StepOutput) -> Self {
        Self {
            step_no: step.step_no,
            key: step.kind(),
            success: false,
            result,
        }
    }

    /// Serialize for persistence.
    pub fn to_json(&self) -> serde_json::Value {
        // Every field is plain data; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
