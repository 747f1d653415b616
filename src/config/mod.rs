//! Application configuration module
//!
//! Process settings are loaded from environment variables using the
//! `config` and `dotenvy` crates, with the `QUERYON` prefix and `__` between
//! nested keys. Bot behaviour ([`BotConfig`]) is a separate JSON document,
//! read from the path in `QUERYON__BOT_CONFIG_PATH` when set.
//!
//! # Example
//!
//! ```no_run
//! use queryon::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Bot name: {}", config.bot.bot_name);
//! ```

mod ai;
mod bot;
mod database;
mod error;
mod logging;
mod retrieval;
mod tools;

pub use ai::AiConfig;
pub use bot::{BotConfig, FieldSpec, ResponseMessages};
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::{LogFormat, LoggingConfig};
pub use retrieval::RetrievalConfig;
pub use tools::{HttpToolSpec, ToolsConfig};

use serde::Deserialize;
use std::path::PathBuf;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bot behaviour, filled from `bot_config_path` by [`AppConfig::load()`]
    #[serde(skip)]
    pub bot: BotConfig,

    /// JSON file holding the bot configuration
    #[serde(default)]
    pub bot_config_path: Option<PathBuf>,

    /// Model provider (chat, embeddings)
    #[serde(default)]
    pub ai: AiConfig,

    /// Vector store for the RAG handler
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// PostgreSQL conversation store; in-memory when absent
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// JSON array of rules for the in-memory rule repository
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    /// HTTP tools, filled from `tools_path` by [`AppConfig::load()`]
    #[serde(skip)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub tools_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `QUERYON` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Reads the bot and tool configuration files, if named
    ///
    /// # Environment Variable Format
    ///
    /// - `QUERYON__AI__CHAT_MODEL=gpt-4o` -> `ai.chat_model = gpt-4o`
    /// - `QUERYON__DATABASE__URL=...` -> `database.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed or the bot
    /// configuration file cannot be read.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("QUERYON")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        if let Some(path) = &config.bot_config_path {
            config.bot = BotConfig::load_file(path)?;
        }
        if let Some(path) = &config.tools_path {
            config.tools = ToolsConfig::load_file(path)?;
        }

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.bot.validate()?;
        self.ai.validate()?;
        self.retrieval.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.tools.validate()?;
        Ok(())
    }

    /// True when model calls can be made.
    pub fn is_online(&self) -> bool {
        self.ai.has_api_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orchestrator::IntentType;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 7] = [
        "QUERYON__AI__API_KEY",
        "QUERYON__AI__CHAT_MODEL",
        "QUERYON__RETRIEVAL__QDRANT_URL",
        "QUERYON__DATABASE__URL",
        "QUERYON__LOGGING__FORMAT",
        "QUERYON__BOT_CONFIG_PATH",
        "QUERYON__TOOLS_PATH",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = AppConfig::load();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert!(!config.is_online());
        assert!(config.database.is_none());
        assert!(!config.retrieval.is_configured());
        assert_eq!(config.bot, BotConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("QUERYON__AI__API_KEY", "sk-xxx");
        env::set_var("QUERYON__AI__CHAT_MODEL", "gpt-4o");
        env::set_var("QUERYON__RETRIEVAL__QDRANT_URL", "http://localhost:6333");
        env::set_var("QUERYON__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("QUERYON__LOGGING__FORMAT", "json");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_online());
        assert_eq!(config.ai.chat_model, "gpt-4o");
        assert!(config.retrieval.is_configured());
        assert_eq!(
            config.database.as_ref().map(|d| d.url.as_str()),
            Some("postgresql://test@localhost/test")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_bot_config_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.json");
        std::fs::write(&path, r#"{"enabled_intents": ["direct"], "bot_name": "Kafe"}"#).unwrap();
        env::set_var("QUERYON__BOT_CONFIG_PATH", &path);
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.bot.enabled_intents, vec![IntentType::Direct]);
        assert_eq!(config.bot.bot_name, "Kafe");
    }

    #[test]
    fn test_load_tools_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(
            &path,
            r#"{"tools": [{"name": "order_status", "description": "Sipariş durumu", "url": "http://localhost:9000/orders"}]}"#,
        )
        .unwrap();
        env::set_var("QUERYON__TOOLS_PATH", &path);
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.tools.tools.len(), 1);
        assert_eq!(config.tools.tools[0].name, "order_status");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_bot_config_file_fails() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("QUERYON__BOT_CONFIG_PATH", "/nonexistent/queryon/bot.json");
        let result = AppConfig::load();
        clear_env();

        assert!(matches!(result, Err(ConfigError::File { .. })));
    }
}
