//! Bot behaviour configuration
//!
//! `BotConfig` is the per-tenant document that drives the decision engine's
//! gates and fallbacks. It is persisted as JSON and read leniently: unknown
//! or malformed values fall back to their defaults instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

use super::error::{ConfigError, ValidationError};
use crate::domain::orchestrator::{IntentType, LowConfidenceStrategy, RagUnavailablePolicy};
use crate::domain::rules::ChoiceMatching;

/// Longest per-call LLM bound accepted by validation (one hour).
const MAX_LLM_TIMEOUT_SECS: f64 = 3600.0;

/// One field a bot collects in appointment or order mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub required: bool,
    /// When set, only these values are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Fixed user-facing texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessages {
    /// Asked when confidence is too low and the strategy is `ask_user`.
    #[serde(default = "default_clarification")]
    pub clarification: String,

    /// Returned when RAG is needed but unavailable and the policy is `ask_user`.
    #[serde(default = "default_rag_unavailable")]
    pub rag_unavailable: String,

    /// Generic apology for unrecoverable provider failures.
    #[serde(default = "default_service_error")]
    pub service_error: String,

    /// Shown by front ends when a decision ends without an answer.
    #[serde(default = "default_no_answer")]
    pub no_answer: String,
}

impl Default for ResponseMessages {
    fn default() -> Self {
        Self {
            clarification: default_clarification(),
            rag_unavailable: default_rag_unavailable(),
            service_error: default_service_error(),
            no_answer: default_no_answer(),
        }
    }
}

fn default_clarification() -> String {
    "Tam olarak anlayamadım. Lütfen sorunuzu biraz daha açar mısınız?".to_string()
}

fn default_rag_unavailable() -> String {
    "Arama servisine şu an ulaşılamıyor. Lütfen daha sonra tekrar deneyin.".to_string()
}

fn default_service_error() -> String {
    "Üzgünüm, şu anda yanıt veremiyorum. Lütfen daha sonra tekrar deneyin.".to_string()
}

fn default_no_answer() -> String {
    "Bu konuda bir bilgi bulamadım.".to_string()
}

/// Decision engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_enabled_intents")]
    pub enabled_intents: Vec<IntentType>,

    /// Used for low-confidence fallback and disabled intents.
    #[serde(default = "default_intent")]
    pub default_intent: IntentType,

    /// Try keyword rules before classification.
    #[serde(default = "default_true")]
    pub rules_first: bool,

    /// Re-dispatch to Direct when RAG finds nothing.
    #[serde(default = "default_true")]
    pub fallback_to_direct: bool,

    #[serde(default)]
    pub when_rag_unavailable: RagUnavailablePolicy,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default)]
    pub low_confidence_strategy: LowConfidenceStrategy,

    #[serde(default = "default_embedding_threshold")]
    pub embedding_confidence_threshold: f64,

    #[serde(default)]
    pub classification_prompt_override: Option<String>,

    /// Per-call bound on model calls; `None` is unbounded.
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_seconds: Option<f64>,

    /// User+assistant pairs of history given to the engine. 0 disables history.
    #[serde(default = "default_max_turns")]
    pub max_conversation_turns: usize,

    #[serde(default)]
    pub choice_matching: ChoiceMatching,

    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// System prompt persona for model answers.
    #[serde(default)]
    pub persona_prompt: Option<String>,

    /// Topics or actions the bot must never engage in.
    #[serde(default)]
    pub restrictions: Option<String>,

    #[serde(default)]
    pub appointment_fields: Vec<FieldSpec>,

    #[serde(default)]
    pub order_mode_enabled: bool,

    #[serde(default)]
    pub order_fields: Vec<FieldSpec>,

    #[serde(default)]
    pub messages: ResponseMessages,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled_intents: default_enabled_intents(),
            default_intent: default_intent(),
            rules_first: true,
            fallback_to_direct: true,
            when_rag_unavailable: RagUnavailablePolicy::default(),
            min_confidence: default_min_confidence(),
            low_confidence_strategy: LowConfidenceStrategy::default(),
            embedding_confidence_threshold: default_embedding_threshold(),
            classification_prompt_override: None,
            llm_timeout_seconds: default_llm_timeout(),
            max_conversation_turns: default_max_turns(),
            choice_matching: ChoiceMatching::default(),
            bot_name: default_bot_name(),
            persona_prompt: None,
            restrictions: None,
            appointment_fields: Vec::new(),
            order_mode_enabled: false,
            order_fields: Vec::new(),
            messages: ResponseMessages::default(),
        }
    }
}

fn default_enabled_intents() -> Vec<IntentType> {
    IntentType::ALL.to_vec()
}

fn default_intent() -> IntentType {
    IntentType::Rag
}

fn default_true() -> bool {
    true
}

fn default_min_confidence() -> f64 {
    0.7
}

fn default_embedding_threshold() -> f64 {
    0.85
}

fn default_llm_timeout() -> Option<f64> {
    Some(60.0)
}

fn default_max_turns() -> usize {
    10
}

fn default_bot_name() -> String {
    "Assistant".to_string()
}

impl BotConfig {
    pub fn is_enabled(&self, intent: IntentType) -> bool {
        self.enabled_intents.contains(&intent)
    }

    /// Number of history messages to load (two per turn).
    pub fn history_limit(&self) -> usize {
        self.max_conversation_turns.saturating_mul(2)
    }

    /// Builds a config from a persisted JSON document.
    ///
    /// Missing keys use defaults. Unknown enum values, non-numeric numbers
    /// and wrongly typed fields fall back to defaults; an empty or
    /// all-invalid `enabled_intents` list enables every intent; a
    /// non-numeric timeout becomes 60 s while `null` means unbounded.
    pub fn from_value(value: &Value) -> Self {
        let Some(data) = value.as_object() else {
            return Self::default();
        };
        let defaults = Self::default();

        let enabled_intents = match data.get("enabled_intents").and_then(Value::as_array) {
            Some(raw) => {
                let mut intents = Vec::new();
                for intent in raw.iter().filter_map(parse_intent) {
                    if !intents.contains(&intent) {
                        intents.push(intent);
                    }
                }
                if intents.is_empty() {
                    default_enabled_intents()
                } else {
                    intents
                }
            }
            None => default_enabled_intents(),
        };

        let llm_timeout_seconds = match data.get("llm_timeout_seconds") {
            None => defaults.llm_timeout_seconds,
            Some(Value::Null) => None,
            Some(v) => Some(number(v).filter(|t| *t > 0.0).unwrap_or(60.0)),
        };

        let messages = data
            .get("messages")
            .and_then(|m| serde_json::from_value(m.clone()).ok())
            .unwrap_or_default();

        Self {
            enabled_intents,
            default_intent: data
                .get("default_intent")
                .and_then(parse_intent)
                .unwrap_or(defaults.default_intent),
            rules_first: flag(data, "rules_first", defaults.rules_first),
            fallback_to_direct: flag(data, "fallback_to_direct", defaults.fallback_to_direct),
            when_rag_unavailable: text(data, "when_rag_unavailable")
                .and_then(RagUnavailablePolicy::parse)
                .unwrap_or_default(),
            min_confidence: data
                .get("min_confidence")
                .and_then(number)
                .unwrap_or(defaults.min_confidence),
            low_confidence_strategy: text(data, "low_confidence_strategy")
                .and_then(LowConfidenceStrategy::parse)
                .unwrap_or_default(),
            embedding_confidence_threshold: data
                .get("embedding_confidence_threshold")
                .and_then(number)
                .unwrap_or(defaults.embedding_confidence_threshold),
            classification_prompt_override: non_empty(data, "classification_prompt_override"),
            llm_timeout_seconds,
            max_conversation_turns: data
                .get("max_conversation_turns")
                .and_then(number)
                .filter(|n| *n >= 0.0)
                .map(|n| n as usize)
                .unwrap_or(defaults.max_conversation_turns),
            choice_matching: text(data, "choice_matching")
                .and_then(ChoiceMatching::parse)
                .unwrap_or_default(),
            bot_name: non_empty(data, "bot_name").unwrap_or(defaults.bot_name),
            persona_prompt: non_empty(data, "persona_prompt"),
            restrictions: non_empty(data, "restrictions"),
            appointment_fields: fields(data, "appointment_fields"),
            order_mode_enabled: flag(data, "order_mode_enabled", false),
            order_fields: fields(data, "order_fields"),
            messages,
        }
    }

    /// Serializes to the persisted JSON document.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Reads a persisted JSON document.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_value(&value))
    }

    /// Writes the JSON document, pretty-printed.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(&self.to_value()).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, raw).map_err(|source| ConfigError::File {
            path: path.display().to_string(),
            source,
        })
    }

    /// Validate bot configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled_intents.is_empty() {
            return Err(ValidationError::NoIntentsEnabled);
        }
        for (field, value) in [
            ("min_confidence", self.min_confidence),
            ("embedding_confidence_threshold", self.embedding_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::NotAProbability { field, value });
            }
        }
        if let Some(timeout) = self.llm_timeout_seconds {
            if !timeout.is_finite() || timeout <= 0.0 || timeout > MAX_LLM_TIMEOUT_SECS {
                return Err(ValidationError::InvalidTimeout("llm_timeout_seconds"));
            }
        }
        if self.bot_name.trim().is_empty() {
            return Err(ValidationError::MissingRequired("bot_name"));
        }
        check_field_keys("appointment_fields", &self.appointment_fields)?;
        check_field_keys("order_fields", &self.order_fields)?;
        Ok(())
    }
}

fn check_field_keys(list: &'static str, specs: &[FieldSpec]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for spec in specs {
        let key = spec.key.trim();
        if key.is_empty() || !seen.insert(key) {
            return Err(ValidationError::InvalidFieldKey {
                list,
                key: spec.key.clone(),
            });
        }
    }
    Ok(())
}

fn parse_intent(value: &Value) -> Option<IntentType> {
    value.as_str()?.parse().ok()
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(data: &Map<String, Value>, key: &str, default: bool) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn text<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn non_empty(data: &Map<String, Value>, key: &str) -> Option<String> {
    text(data, key)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn fields(data: &Map<String, Value>, key: &str) -> Vec<FieldSpec> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
