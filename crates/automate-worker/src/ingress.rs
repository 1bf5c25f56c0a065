//! Ingress loop: turns run triggers into executions.

use async_trait::async_trait;
use automate_steps::StepExecutor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::error::{BrokerError, StoreError};
use crate::execution::{Execution, RetryPolicy};
use crate::manager::ExecutionManager;
use crate::store::RunStateStore;

/// Idle delay after a receive that yielded nothing, or after a broker error.
const IDLE_DELAY: Duration = Duration::from_millis(100);

/// Broker errors in a row after which the loop gives up.
const MAX_CONSECUTIVE_BROKER_ERRORS: u32 = 10;

/// Request to run a workflow, as published by the workflow API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTrigger {
    pub workflow_id: String,
    pub execution_id: String,
}

/// A received message: its raw payload and the handle used to settle it.
#[derive(Debug)]
pub struct Delivery<M> {
    pub payload: Vec<u8>,
    pub message: M,
}

/// At-least-once source of run triggers.
#[async_trait]
pub trait TriggerSource: Send + Sync {
    /// Handle used to acknowledge a delivery.
    type Message: Send + Sync;

    /// Next delivery, `None` if nothing arrived in time, `BrokerError::Closed`
    /// once the source is exhausted.
    async fn receive(&self) -> Result<Option<Delivery<Self::Message>>, BrokerError>;

    /// The delivery was handled and must not be redelivered.
    async fn ack(&self, message: &Self::Message) -> Result<(), BrokerError>;

    /// The delivery was not handled and should be redelivered.
    async fn nack(&self, message: &Self::Message) -> Result<(), BrokerError>;
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// An execution was submitted; acked.
    Submitted,
    /// The workflow has no steps; acked without store writes.
    SkippedEmpty,
    /// The payload is not a run trigger; acked.
    Malformed,
    /// The workflow's steps cannot be decoded; the run was marked failed and acked.
    Rejected,
    /// The steps could not be read; nacked for redelivery.
    Deferred,
}

/// Consumes run triggers and submits executions to the manager.
pub struct IngressLoop<S: TriggerSource> {
    source: S,
    store: Arc<dyn RunStateStore>,
    executor: Arc<dyn StepExecutor>,
    manager: ExecutionManager,
    policy: RetryPolicy,
}

impl<S: TriggerSource> IngressLoop<S> {
    pub fn new(
        source: S,
        store: Arc<dyn RunStateStore>,
        executor: Arc<dyn StepExecutor>,
        manager: ExecutionManager,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            store,
            executor,
            manager,
            policy,
        }
    }

    pub fn manager(&self) -> &ExecutionManager {
        &self.manager
    }

    /// Process deliveries until the source closes.
    ///
    /// A failed receive or settle only affects that delivery; the loop fails
    /// after `MAX_CONSECUTIVE_BROKER_ERRORS` broker errors in a row.
    pub async fn run(&self) -> Result<(), BrokerError> {
        let mut consecutive_errors = 0;

        loop {
            if !self.manager.has_available_slots() {
                tracing::debug!(
                    capacity = self.manager.capacity(),
                    "All execution slots busy, waiting"
                );
            }
            self.manager.wait_for_slot().await;

            let result = match self.source.receive().await {
                Ok(Some(delivery)) => self.process(delivery).await.map(|_| ()),
                Ok(None) => {
                    consecutive_errors = 0;
                    tokio::time::sleep(IDLE_DELAY).await;
                    continue;
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => consecutive_errors = 0,
                Err(BrokerError::Closed) => {
                    tracing::info!("Trigger source closed, ingress stopping");
                    return Ok(());
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_BROKER_ERRORS {
                        tracing::error!(
                            error = %e,
                            consecutive_errors,
                            "Giving up on trigger source"
                        );
                        return Err(e);
                    }
                    tracing::warn!(error = %e, consecutive_errors, "Trigger source error");
                    tokio::time::sleep(IDLE_DELAY).await;
                }
            }
        }
    }

    /// Handle one delivery and settle it with the source.
    pub async fn process(
        &self,
        delivery: Delivery<S::Message>,
    ) -> Result<Disposition, BrokerError> {
        let disposition = self.dispatch(&delivery.payload).await;

        match disposition {
            Disposition::Deferred => self.source.nack(&delivery.message).await?,
            _ => self.source.ack(&delivery.message).await?,
        }

        Ok(disposition)
    }

    async fn dispatch(&self, payload: &[u8]) -> Disposition {
        let trigger: RunTrigger = match serde_json::from_slice(payload) {
            Ok(trigger) => trigger,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping malformed run trigger"
                );
                return Disposition::Malformed;
            }
        };

        tracing::debug!(
            workflow_id = %trigger.workflow_id,
            execution_id = %trigger.execution_id,
            "Received run trigger"
        );

        let steps = match self.store.load_steps(&trigger.workflow_id).await {
            Ok(steps) => steps,
            Err(StoreError::InvalidStep(e)) => {
                let reason = format!("Invalid workflow definition: {}", e);
                tracing::error!(
                    workflow_id = %trigger.workflow_id,
                    execution_id = %trigger.execution_id,
                    reason = %reason,
                    "Rejecting run"
                );
                if let Err(e) = self.store.mark_failed(&trigger.execution_id, &reason).await {
                    tracing::error!(
                        execution_id = %trigger.execution_id,
                        error = %e,
                        "Failed to mark run as failed"
                    );
                }
                return Disposition::Rejected;
            }
            Err(e) => {
                tracing::warn!(
                    workflow_id = %trigger.workflow_id,
                    error = %e,
                    "Failed to load steps, requesting redelivery"
                );
                return Disposition::Deferred;
            }
        };

        if steps.is_empty() {
            tracing::warn!(
                workflow_id = %trigger.workflow_id,
                execution_id = %trigger.execution_id,
                "Workflow has no steps, dropping trigger"
            );
            return Disposition::SkippedEmpty;
        }

        let execution = Execution::new(
            trigger.execution_id,
            trigger.workflow_id,
            steps,
            self.store.clone(),
            self.executor.clone(),
            self.policy,
        );
        self.manager.submit(execution).await;

        Disposition::Submitted
    }
}

/// In-process trigger source fed by an mpsc channel.
pub struct ChannelTriggerSource {
    receiver: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl ChannelTriggerSource {
    /// Create a source and the sender that feeds it. The source closes once
    /// every sender is dropped and the buffer is drained.
    pub fn new(buffer: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            tx,
            Self {
                receiver: Mutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl TriggerSource for ChannelTriggerSource {
    type Message = ();

    async fn receive(&self) -> Result<Option<Delivery<()>>, BrokerError> {
        match self.receiver.lock().await.recv().await {
            Some(payload) => Ok(Some(Delivery {
                payload,
                message: (),
            })),
            None => Err(BrokerError::Closed),
        }
    }

    async fn ack(&self, _message: &()) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn nack(&self, _message: &()) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRunStateStore, StoreCall};
    use automate_steps::{DefaultStepExecutor, MailjetConfig, Step, StepAction, StepRole};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records how each delivery was settled.
    #[derive(Default)]
    struct Recording {
        acks: AtomicUsize,
        nacks: AtomicUsize,
    }

    #[async_trait]
    impl TriggerSource for Recording {
        type Message = ();

        async fn receive(&self) -> Result<Option<Delivery<()>>, BrokerError> {
            Err(BrokerError::Closed)
        }

        async fn ack(&self, _message: &()) -> Result<(), BrokerError> {
            self.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn nack(&self, _message: &()) -> Result<(), BrokerError> {
            self.nacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ingress(store: Arc<MemoryRunStateStore>) -> IngressLoop<Recording> {
        IngressLoop::new(
            Recording::default(),
            store,
            Arc::new(
                DefaultStepExecutor::new(MailjetConfig::default(), Duration::from_secs(1))
                    .unwrap(),
            ),
            ExecutionManager::new(5),
            fast_policy(),
        )
    }

    fn delivery(payload: &str) -> Delivery<()> {
        Delivery {
            payload: payload.as_bytes().to_vec(),
            message: (),
        }
    }

    fn webhook_step() -> Step {
        Step {
            id: "job-1".to_string(),
            name: "hook".to_string(),
            description: None,
            workflow_id: "wf-1".to_string(),
            step_no: 1,
            role: StepRole::Trigger,
            action: StepAction::Webhook { input: None },
        }
    }

    /// Channel-backed source whose first `failing_acks` acks fail.
    struct AckFailing {
        inner: ChannelTriggerSource,
        failing_acks: AtomicUsize,
    }

    #[async_trait]
    impl TriggerSource for AckFailing {
        type Message = ();

        async fn receive(&self) -> Result<Option<Delivery<()>>, BrokerError> {
            self.inner.receive().await
        }

        async fn ack(&self, _message: &()) -> Result<(), BrokerError> {
            let remaining = self.failing_acks.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_acks.store(remaining - 1, Ordering::SeqCst);
                return Err(BrokerError::Ack("connection reset".to_string()));
            }
            Ok(())
        }

        async fn nack(&self, _message: &()) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    /// Source whose every receive fails.
    struct Unreachable;

    #[async_trait]
    impl TriggerSource for Unreachable {
        type Message = ();

        async fn receive(&self) -> Result<Option<Delivery<()>>, BrokerError> {
            Err(BrokerError::JetStream("no responders".to_string()))
        }

        async fn ack(&self, _message: &()) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn nack(&self, _message: &()) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_failed_ack_does_not_stop_ingress() {
        let store = Arc::new(MemoryRunStateStore::new());
        store.insert_workflow("wf-1", &[webhook_step()]).await;
        store.create_run("run-1", 1).await;
        store.create_run("run-2", 1).await;

        let (tx, inner) = ChannelTriggerSource::new(4);
        let ingress = IngressLoop::new(
            AckFailing {
                inner,
                failing_acks: AtomicUsize::new(1),
            },
            store.clone(),
            Arc::new(
                DefaultStepExecutor::new(MailjetConfig::default(), Duration::from_secs(1))
                    .unwrap(),
            ),
            ExecutionManager::new(5),
            fast_policy(),
        );

        tx.send(br#"{"workflowId":"wf-1","executionId":"run-1"}"#.to_vec())
            .await
            .unwrap();
        tx.send(br#"{"workflowId":"wf-1","executionId":"run-2"}"#.to_vec())
            .await
            .unwrap();
        drop(tx);

        tokio_test::assert_ok!(ingress.run().await);
        tokio::time::timeout(Duration::from_secs(5), ingress.manager().wait_idle())
            .await
            .unwrap();

        for run_id in ["run-1", "run-2"] {
            assert_eq!(
                store.run(run_id).await.unwrap().status,
                crate::store::RunStatus::Completed
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_broker_errors_end_ingress() {
        let store = Arc::new(MemoryRunStateStore::new());
        let ingress = IngressLoop::new(
            Unreachable,
            store.clone(),
            Arc::new(
                DefaultStepExecutor::new(MailjetConfig::default(), Duration::from_secs(1))
                    .unwrap(),
            ),
            ExecutionManager::new(5),
            fast_policy(),
        );

        let err = ingress.run().await.unwrap_err();
        assert!(matches!(err, BrokerError::JetStream(_)));
        assert!(store.calls().await.is_empty());
    }

    #[test]
    fn test_trigger_wire_format() {
        let trigger: RunTrigger =
            serde_json::from_str(r#"{"workflowId":"wf-1","executionId":"run-1"}"#).unwrap();
        assert_eq!(trigger.workflow_id, "wf-1");
        assert_eq!(trigger.execution_id, "run-1");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_acked() {
        let store = Arc::new(MemoryRunStateStore::new());
        let ingress = ingress(store.clone());

        let disposition = ingress.process(delivery("{not json")).await.unwrap();
        assert_eq!(disposition, Disposition::Malformed);
        assert_eq!(ingress.source.acks.load(Ordering::SeqCst), 1);
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_is_nacked() {
        let store = Arc::new(MemoryRunStateStore::new());
        store.fail_next_loads(1).await;
        let ingress = ingress(store.clone());

        let disposition = ingress
            .process(delivery(r#"{"workflowId":"wf-1","executionId":"run-1"}"#))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Deferred);
        assert_eq!(ingress.source.nacks.load(Ordering::SeqCst), 1);
        assert_eq!(ingress.source.acks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_definition_fails_run() {
        let store = Arc::new(MemoryRunStateStore::new());
        let mut record = webhook_step().to_record();
        record.app = "ftp".to_string();
        store.insert_records("wf-1", vec![record]).await;
        store.create_run("run-1", 1).await;
        let ingress = ingress(store.clone());

        let disposition = ingress
            .process(delivery(r#"{"workflowId":"wf-1","executionId":"run-1"}"#))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Rejected);

        let calls = store.calls().await;
        assert!(matches!(
            calls.last(),
            Some(StoreCall::MarkFailed { run_id, .. }) if run_id == "run-1"
        ));
        assert!(store.run("run-1").await.unwrap().error.unwrap().contains("ftp"));
    }

    #[tokio::test]
    async fn test_valid_trigger_is_submitted() {
        let store = Arc::new(MemoryRunStateStore::new());
        store.insert_workflow("wf-1", &[webhook_step()]).await;
        store.create_run("run-1", 1).await;
        let ingress = ingress(store.clone());

        let disposition = ingress
            .process(delivery(r#"{"workflowId":"wf-1","executionId":"run-1"}"#))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Submitted);

        tokio::time::timeout(Duration::from_secs(5), ingress.manager().wait_idle())
            .await
            .unwrap();
        assert_eq!(
            store.run("run-1").await.unwrap().status,
            crate::store::RunStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_channel_source_closes_when_senders_drop() {
        let (tx, source) = ChannelTriggerSource::new(4);
        tx.send(b"payload".to_vec()).await.unwrap();
        drop(tx);

        let first = source.receive().await.unwrap().unwrap();
        assert_eq!(first.payload, b"payload");
        assert!(matches!(source.receive().await, Err(BrokerError::Closed)));
    }
}
