//! HTTP tool definitions, read from a JSON file.
//!
//! ```json
//! {
//!   "timeout_secs": 15,
//!   "tools": [
//!     {
//!       "name": "order_status",
//!       "description": "Looks up the status of an order",
//!       "parameters": {"type": "object", "properties": {"order_id": {"type": "string"}}},
//!       "url": "http://orders.internal/status",
//!       "triggers": ["sipariş", "kargo"]
//!     }
//!   ]
//! }
//! ```

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, ValidationError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HttpToolSpec {
    pub name: String,
    pub description: String,

    /// JSON schema of the arguments object
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,

    pub url: String,

    /// Keywords that make the pre-classifier suggest the tool intent
    #[serde(default)]
    pub triggers: Vec<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub tools: Vec<HttpToolSpec>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            tools: Vec::new(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate tool definitions
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("tools.timeout_secs"));
        }
        let mut seen = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() || !seen.insert(tool.name.as_str()) {
                return Err(ValidationError::InvalidFieldKey {
                    list: "tools",
                    key: tool.name.clone(),
                });
            }
            if !tool.url.starts_with("http://") && !tool.url.starts_with("https://") {
                return Err(ValidationError::InvalidUrl("tools.url"));
            }
        }
        Ok(())
    }
}

fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_file_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(
            &path,
            r#"{"tools": [{"name": "weather", "description": "Hava durumu", "url": "https://api.example.com/weather"}]}"#,
        )
        .unwrap();

        let config = ToolsConfig::load_file(&path).unwrap();

        assert_eq!(config.timeout_secs, 30);
        assert!(config.tools[0].enabled);
        assert_eq!(config.tools[0].parameters["type"], "object");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let spec = HttpToolSpec {
            name: "weather".to_string(),
            description: String::new(),
            parameters: empty_object_schema(),
            url: "https://api.example.com".to_string(),
            triggers: Vec::new(),
            enabled: true,
        };
        let config = ToolsConfig {
            tools: vec![spec.clone(), spec],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldKey { .. })
        ));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = ToolsConfig {
            tools: vec![HttpToolSpec {
                name: "weather".to_string(),
                description: String::new(),
                parameters: empty_object_schema(),
                url: "ftp://x".to_string(),
                triggers: Vec::new(),
                enabled: true,
            }],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidUrl("tools.url")));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = ToolsConfig::load_file("/nonexistent/tools.json");
        assert!(matches!(result, Err(ConfigError::File { .. })));
    }
}
