//! Step dispatch.

use async_trait::async_trait;
use std::time::Duration;

use crate::email::{EmailStep, MailjetConfig};
use crate::error::StepError;
use crate::http::HttpStep;
use crate::result::{EmailReceipt, StepOutput, StepResult, SCHEDULE_ACK, WEBHOOK_ACK};
use crate::step::{Step, StepAction};

/// Runs one step against the outside world.
///
/// Implementations never retry; the caller owns retry policy.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &Step) -> Result<StepResult, StepError>;
}

/// Step executor for every built-in step kind.
#[derive(Clone)]
pub struct DefaultStepExecutor {
    http: HttpStep,
    email: EmailStep,
}

impl DefaultStepExecutor {
    /// Create an executor whose outbound calls give up after `timeout`.
    pub fn new(mailjet: MailjetConfig, timeout: Duration) -> Result<Self, StepError> {
        Ok(Self {
            http: HttpStep::new(timeout)?,
            email: EmailStep::new(mailjet, timeout)?,
        })
    }
}

#[async_trait]
impl StepExecutor for DefaultStepExecutor {
    async fn execute(&self, step: &Step) -> Result<StepResult, StepError> {
        tracing::debug!(
            step_no = step.step_no,
            kind = %step.kind(),
            name = %step.name,
            "Executing step"
        );

        match &step.action {
            StepAction::Http { input } => {
                let response = self.http.request(input).await?;
                Ok(StepResult::succeeded(step, StepOutput::Http(response)))
            }
            StepAction::Email { input } => {
                let success = self.email.send(input).await;
                let output = StepOutput::Email(EmailReceipt { success });
                if success {
                    Ok(StepResult::succeeded(step, output))
                } else {
                    Ok(StepResult::failed(step, output))
                }
            }
            StepAction::Webhook { .. } => Ok(StepResult::succeeded(
                step,
                StepOutput::Acknowledged(WEBHOOK_ACK.to_string()),
            )),
            StepAction::Schedule { schedule } => {
                if let Some(spec) = schedule {
                    tracing::trace!(mode = ?spec.mode, "Schedule trigger acknowledged");
                }
                Ok(StepResult::succeeded(
                    step,
                    StepOutput::Acknowledged(SCHEDULE_ACK.to_string()),
                ))
            }
        }
    }
}
