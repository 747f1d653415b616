//! PostgreSQL settings for the rule and conversation stores.
//!
//! The section is optional. Without it the CLI keeps rules and
//! conversations in memory.

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

use super::error::ValidationError;

const MAX_POOL: u32 = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    /// Upper bound on pooled connections. Each turn holds one for a handful
    /// of short writes, so a small pool goes a long way.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-statement limit applied on every connection, in milliseconds.
    /// Zero leaves the server default in place.
    #[serde(default)]
    pub statement_timeout_ms: u64,

    /// Apply `migrations/` before the stores are handed out.
    #[serde(default = "default_migrate")]
    pub migrate: bool,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Builds the pool the Postgres stores share.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        let mut options = PgConnectOptions::from_str(&self.url)?.application_name("queryon");
        if self.statement_timeout_ms > 0 {
            options = options.options([("statement_timeout", self.statement_timeout_ms.to_string())]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.pool_size)
            .acquire_timeout(self.connect_timeout())
            .connect_with(options)
            .await?;

        if self.migrate {
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!(pool_size = self.pool_size, "Store schema is up to date");
        }
        Ok(pool)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingRequired("database.url"));
        }
        if !["postgres://", "postgresql://"].iter().any(|scheme| url.starts_with(scheme)) {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.pool_size == 0 || self.pool_size > MAX_POOL {
            return Err(ValidationError::InvalidPoolSize(self.pool_size));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("database.connect_timeout_secs"));
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
            statement_timeout_ms: 0,
            migrate: default_migrate(),
        }
    }
}

fn default_pool_size() -> u32 {
    8
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_migrate() -> bool {
    true
}
