//! Intent routing vocabulary and fallback policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The coarse category a message is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    /// Answer from the knowledge base.
    Rag,
    /// Answer straight from the language model.
    Direct,
    /// Answer from a deterministic rule.
    Rule,
    /// Call an external tool.
    Tool,
}

impl IntentType {
    pub const ALL: [IntentType; 4] = [
        IntentType::Rag,
        IntentType::Direct,
        IntentType::Rule,
        IntentType::Tool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::Rag => "rag",
            IntentType::Direct => "direct",
            IntentType::Rule => "rule",
            IntentType::Tool => "tool",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown intent name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown intent '{0}'")]
pub struct UnknownIntent(pub String);

impl FromStr for IntentType {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rag" => Ok(IntentType::Rag),
            "direct" => Ok(IntentType::Direct),
            "rule" => Ok(IntentType::Rule),
            "tool" => Ok(IntentType::Tool),
            _ => Err(UnknownIntent(s.to_string())),
        }
    }
}

/// Which decision stage produced the routed intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierLayer {
    Pre,
    Embedding,
    Llm,
    /// Rule matched inside an active flow, before classification.
    FlowRule,
    /// Rule matched by the rules-first check, before classification.
    RulesFirst,
}

impl ClassifierLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierLayer::Pre => "pre",
            ClassifierLayer::Embedding => "embedding",
            ClassifierLayer::Llm => "llm",
            ClassifierLayer::FlowRule => "flow_rule",
            ClassifierLayer::RulesFirst => "rules_first",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre" => Some(ClassifierLayer::Pre),
            "embedding" => Some(ClassifierLayer::Embedding),
            "llm" => Some(ClassifierLayer::Llm),
            "flow_rule" => Some(ClassifierLayer::FlowRule),
            "rules_first" => Some(ClassifierLayer::RulesFirst),
            _ => None,
        }
    }
}

impl fmt::Display for ClassifierLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when classification confidence is below `min_confidence`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowConfidenceStrategy {
    /// Route to `default_intent`.
    #[default]
    Fallback,
    /// Ask the user to rephrase.
    AskUser,
}

impl LowConfidenceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LowConfidenceStrategy::Fallback => "fallback",
            LowConfidenceStrategy::AskUser => "ask_user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "fallback" => Some(LowConfidenceStrategy::Fallback),
            "ask_user" => Some(LowConfidenceStrategy::AskUser),
            _ => None,
        }
    }
}

/// What to do when a message is routed to RAG but no RAG handler exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagUnavailablePolicy {
    #[default]
    Direct,
    AskUser,
}

impl RagUnavailablePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RagUnavailablePolicy::Direct => "direct",
            RagUnavailablePolicy::AskUser => "ask_user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "direct" => Some(RagUnavailablePolicy::Direct),
            "ask_user" => Some(RagUnavailablePolicy::AskUser),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_parses_case_insensitively() {
        assert_eq!("RAG".parse::<IntentType>().unwrap(), IntentType::Rag);
        assert_eq!(" tool ".parse::<IntentType>().unwrap(), IntentType::Tool);
        assert!("character".parse::<IntentType>().is_err());
    }

    #[test]
    fn intent_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&IntentType::Direct).unwrap(), "\"direct\"");
    }

    #[test]
    fn layer_round_trips_through_str() {
        for layer in [
            ClassifierLayer::Pre,
            ClassifierLayer::Embedding,
            ClassifierLayer::Llm,
            ClassifierLayer::FlowRule,
            ClassifierLayer::RulesFirst,
        ] {
            assert_eq!(ClassifierLayer::parse(layer.as_str()), Some(layer));
        }
    }

    #[test]
    fn policies_reject_unknown_values() {
        assert_eq!(LowConfidenceStrategy::parse("ask_user"), Some(LowConfidenceStrategy::AskUser));
        assert_eq!(LowConfidenceStrategy::parse("shrug"), None);
        assert_eq!(RagUnavailablePolicy::parse("fallback"), None);
    }
}
