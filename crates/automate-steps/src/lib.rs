//! Automate step library.
//!
//! Typed step definitions and the executors that run them.
//!
//! This crate provides:
//! - `Step` / `StepAction` - one configured unit of work, typed per kind
//! - `StepResult` - the outcome recorded for a step
//! - `StepExecutor` - the async seam the execution engine calls into
//! - HTTP and email step implementations

pub mod email;
pub mod error;
pub mod executor;
pub mod http;
pub mod result;
pub mod step;

#[cfg(test)]
mod test_support;

pub use email::{EmailStep, MailjetConfig};
pub use error::StepError;
pub use executor::{DefaultStepExecutor, StepExecutor};
pub use http::HttpStep;
pub use result::{
    EmailReceipt, HttpResponse, StepOutput, StepResult, SCHEDULE_ACK, WEBHOOK_ACK,
};
pub use step::{
    EmailInput, HttpInput, HttpMethod, ScheduleSpec, Step, StepAction, StepKind, StepRecord,
    StepRole, WebhookInput,
};
