//! Database configuration for the PostgreSQL run state store.

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;
use std::time::Duration;

/// Connection settings for the workflow API's database.
///
/// Read from `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`,
/// `POSTGRES_PASSWORD`, `POSTGRES_DATABASE`, `POSTGRES_MAX_CONNECTIONS`,
/// `POSTGRES_MIN_CONNECTIONS` and `POSTGRES_ACQUIRE_TIMEOUT_SECS`.
/// `DATABASE_URL` takes precedence over the individual connection fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,

    #[serde(skip)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "automate".to_string(),
            password: String::new(),
            database: "automate".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
            url: None,
        }
    }
}

impl DatabaseConfig {
    /// Load from `POSTGRES_*` variables plus the optional `DATABASE_URL`.
    pub fn from_env() -> Result<Self, envy::Error> {
        let mut config: DatabaseConfig = envy::prefixed("POSTGRES_").from_env()?;
        config.url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());
        Ok(config)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        match &self.url {
            Some(url) => PgConnectOptions::from_str(url),
            None => Ok(PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.database)),
        }
    }

    /// Connection target for logs, without credentials.
    pub fn display_target(&self) -> String {
        match &self.url {
            Some(_) => "DATABASE_URL".to_string(),
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}
