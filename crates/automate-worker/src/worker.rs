//! Worker lifecycle management.

use anyhow::{Context, Result};
use automate_steps::{DefaultStepExecutor, MailjetConfig};
use std::sync::Arc;

use crate::config::{DatabaseConfig, WorkerConfig};
use crate::db::{create_pool, health_check};
use crate::execution::RetryPolicy;
use crate::ingress::IngressLoop;
use crate::manager::ExecutionManager;
use crate::nats::NatsTriggerSource;
use crate::store::PgRunStateStore;

/// Execution worker: consumes run triggers and executes workflow runs.
pub struct Worker {
    /// Worker configuration.
    config: WorkerConfig,

    /// Postgres-backed run state store.
    store: Arc<PgRunStateStore>,

    /// Trigger ingestion.
    ingress: IngressLoop<NatsTriggerSource>,
}

impl Worker {
    /// Create a new worker.
    pub async fn new(
        config: WorkerConfig,
        database: DatabaseConfig,
        mailjet: MailjetConfig,
    ) -> Result<Self> {
        let pool = create_pool(&database).await?;
        let store = Arc::new(PgRunStateStore::new(pool));

        let executor = Arc::new(
            DefaultStepExecutor::new(mailjet, config.step_timeout)
                .context("Failed to build step executor")?,
        );

        let manager = ExecutionManager::new(config.max_concurrent_executions);

        let source = NatsTriggerSource::connect(
            &config.nats_url,
            &config.nats_stream,
            &config.nats_subject,
            &config.nats_consumer,
        )
        .await?;

        let policy = RetryPolicy::new(config.max_retries_per_step, config.retry_delay);
        let ingress = IngressLoop::new(source, store.clone(), executor, manager, policy);

        Ok(Self {
            config,
            store,
            ingress,
        })
    }

    /// Handle on the execution manager, used to drain in-flight runs on shutdown.
    pub fn manager(&self) -> ExecutionManager {
        self.ingress.manager().clone()
    }

    /// Run the worker until the trigger source closes or fails.
    pub async fn run(&self) -> Result<()> {
        health_check(self.store.pool())
            .await
            .context("Database health check failed")?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        tracing::info!(
            worker_id = %self.config.worker_id,
            hostname = %hostname,
            capacity = self.ingress.manager().capacity(),
            "Worker started"
        );

        self.ingress.run().await?;

        tracing::info!(worker_id = %self.config.worker_id, "Worker stopped consuming");
        Ok(())
    }
}
