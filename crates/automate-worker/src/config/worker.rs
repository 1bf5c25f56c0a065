//! Worker configuration.

use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` (`text` or `json`).
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Execution worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique worker identifier (UUID).
    pub worker_id: String,

    /// NATS server URL.
    pub nats_url: String,

    /// NATS stream name.
    pub nats_stream: String,

    /// Subject run triggers are published on.
    pub nats_subject: String,

    /// Durable NATS consumer name.
    pub nats_consumer: String,

    /// Maximum number of runs executing at once.
    pub max_concurrent_executions: usize,

    /// Attempts per step before the run fails.
    pub max_retries_per_step: u32,

    /// Delay between attempts of the same step.
    pub retry_delay: Duration,

    /// Timeout for one outbound step call.
    pub step_timeout: Duration,

    /// How long shutdown waits for in-flight runs.
    pub shutdown_grace: Duration,

    pub log_format: LogFormat,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            worker_id: std::env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            nats_url: std::env::var("NATS_URL").unwrap_or(defaults.nats_url),
            nats_stream: std::env::var("NATS_STREAM").unwrap_or(defaults.nats_stream),
            nats_subject: std::env::var("NATS_SUBJECT").unwrap_or(defaults.nats_subject),
            nats_consumer: std::env::var("NATS_CONSUMER").unwrap_or(defaults.nats_consumer),
            max_concurrent_executions: env_or(
                "MAX_CONCURRENT_EXECUTIONS",
                defaults.max_concurrent_executions,
            )
            .max(1),
            max_retries_per_step: env_or("MAX_RETRIES_PER_STEP", defaults.max_retries_per_step)
                .max(1),
            retry_delay: Duration::from_millis(env_or("RETRY_DELAY_MS", 1000)),
            step_timeout: Duration::from_secs(env_or("STEP_TIMEOUT_SECS", 30)),
            shutdown_grace: Duration::from_secs(env_or("SHUTDOWN_GRACE_SECS", 30)),
            log_format: LogFormat::from_env(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            nats_stream: "automate_executions".to_string(),
            nats_subject: "automate.executions".to_string(),
            nats_consumer: "automate-worker".to_string(),
            max_concurrent_executions: 5,
            max_retries_per_step: 3,
            retry_delay: Duration::from_secs(1),
            step_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
            log_format: LogFormat::Text,
        }
    }
}
