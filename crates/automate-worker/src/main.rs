//! Automate execution worker binary.
//!
//! Consumes run triggers from NATS and executes workflow runs.

use anyhow::Result;
use automate_steps::MailjetConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use automate_worker::{DatabaseConfig, LogFormat, Worker, WorkerConfig};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,automate_worker=debug,automate_steps=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    init_tracing(config.log_format);

    tracing::info!("Starting Automate execution worker");

    let database = DatabaseConfig::from_env()?;
    let mailjet = MailjetConfig::from_env();

    tracing::info!(
        worker_id = %config.worker_id,
        nats_url = %config.nats_url,
        database = %database.display_target(),
        max_concurrent_executions = config.max_concurrent_executions,
        max_retries_per_step = config.max_retries_per_step,
        "Worker configuration loaded"
    );

    let shutdown_grace = config.shutdown_grace;
    let worker = Worker::new(config, database, mailjet).await?;
    let manager = worker.manager();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    tokio::select! {
        result = worker.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker error");
                return Err(e);
            }
        }
        _ = shutdown => {
            tracing::info!("Shutting down worker");
        }
    }

    let occupancy = manager.occupancy();
    if occupancy.active > 0 || occupancy.pending > 0 {
        tracing::info!(
            active = occupancy.active,
            pending = occupancy.pending,
            grace_secs = shutdown_grace.as_secs(),
            "Waiting for in-flight runs"
        );
        if tokio::time::timeout(shutdown_grace, manager.wait_idle()).await.is_err() {
            tracing::warn!("Shutdown grace period elapsed with runs still in flight");
        }
    }

    tracing::info!("Worker stopped");
    Ok(())
}
