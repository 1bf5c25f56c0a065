#![allow(dead_code)]

use async_trait::async_trait;
use automate_steps::{
    EmailInput, HttpInput, HttpMethod, Step, StepAction, StepError, StepExecutor, StepOutput,
    StepResult, StepRole,
};
use automate_worker::{ExecutionManager, RetryPolicy};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(5))
}

fn step(workflow_id: &str, step_no: u32, role: StepRole, action: StepAction) -> Step {
    Step {
        id: format!("{}-job-{}", workflow_id, step_no),
        name: format!("step {}", step_no),
        description: None,
        workflow_id: workflow_id.to_string(),
        step_no,
        role,
        action,
    }
}

pub fn webhook_step(workflow_id: &str, step_no: u32) -> Step {
    step(
        workflow_id,
        step_no,
        StepRole::Trigger,
        StepAction::Webhook { input: None },
    )
}

pub fn http_step(workflow_id: &str, step_no: u32) -> Step {
    step(
        workflow_id,
        step_no,
        StepRole::Action,
        StepAction::Http {
            input: HttpInput {
                url: "https://api.example.com/orders".to_string(),
                method: HttpMethod::POST,
                headers: HashMap::new(),
                parameters: HashMap::new(),
                body: Some(serde_json::json!({"id": 7})),
            },
        },
    )
}

pub fn email_step(workflow_id: &str, step_no: u32) -> Step {
    step(
        workflow_id,
        step_no,
        StepRole::Action,
        StepAction::Email {
            input: EmailInput {
                recipients: "ops@example.com".to_string(),
                subject: "Order received".to_string(),
                body: "Order 7 was received".to_string(),
            },
        },
    )
}

fn acknowledged(step: &Step) -> StepResult {
    StepResult::succeeded(step, StepOutput::Acknowledged(format!("{} done", step.kind())))
}

/// Succeeds every step except the ones scripted to error or report failure.
#[derive(Default)]
pub struct ScriptedExecutor {
    erroring: HashSet<u32>,
    rejecting: HashSet<u32>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt at `step_no` returns an error.
    pub fn erroring_step(mut self, step_no: u32) -> Self {
        self.erroring.insert(step_no);
        self
    }

    /// Every attempt at `step_no` returns `success: false`.
    pub fn rejecting_step(mut self, step_no: u32) -> Self {
        self.rejecting.insert(step_no);
        self
    }

    /// `(workflow_id, step_no)` of every call, in order.
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, step_no: u32) -> usize {
        self.calls().iter().filter(|(_, n)| *n == step_no).count()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, step: &Step) -> Result<StepResult, StepError> {
        self.calls
            .lock()
            .unwrap()
            .push((step.workflow_id.clone(), step.step_no));

        if self.erroring.contains(&step.step_no) {
            return Err(StepError::Http("connection refused".to_string()));
        }
        if self.rejecting.contains(&step.step_no) {
            return Ok(StepResult::failed(
                step,
                StepOutput::Acknowledged("rejected".to_string()),
            ));
        }
        Ok(acknowledged(step))
    }
}

/// Holds every step until a permit is released, tracking how many run at once.
pub struct GatedExecutor {
    gate: Semaphore,
    started: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl GatedExecutor {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Workflow ids in the order their steps started.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepExecutor for GatedExecutor {
    async fn execute(&self, step: &Step) -> Result<StepResult, StepError> {
        self.started.lock().unwrap().push(step.workflow_id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let permit = self.gate.acquire().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match permit {
            Ok(permit) => {
                permit.forget();
                Ok(acknowledged(step))
            }
            Err(e) => Err(StepError::Http(e.to_string())),
        }
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn drain(manager: &ExecutionManager) {
    tokio::time::timeout(Duration::from_secs(5), manager.wait_idle())
        .await
        .expect("runs did not drain in time");
}
