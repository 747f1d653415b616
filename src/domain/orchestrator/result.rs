//! Decision outcome types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::intent::{ClassifierLayer, IntentType};
use crate::domain::conversation::MessageRole;
use crate::domain::rules::FlowContext;

/// Metadata key holding the flow state to persist after a flow rule fired.
pub const NEXT_FLOW_CONTEXT: &str = "next_flow_context";

/// Clamps a score into `[0, 1]`; NaN becomes 0.
pub fn clip_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One prior turn passed to the engine as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Output of the classifier cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: IntentType,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub layer: ClassifierLayer,
    /// True when served from the classification cache.
    #[serde(default)]
    pub cached: bool,
}

impl ClassificationResult {
    pub fn new(intent: IntentType, confidence: f64, layer: ClassifierLayer) -> Self {
        Self {
            intent,
            confidence: clip_confidence(confidence),
            reasoning: None,
            layer,
            cached: false,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// A copy marked as a cache hit.
    pub fn from_cache(&self) -> Self {
        Self {
            cached: true,
            ..self.clone()
        }
    }

    /// Same (intent, confidence, layer) triple, ignoring reasoning and cache flag.
    pub fn same_decision(&self, other: &ClassificationResult) -> bool {
        self.intent == other.intent && self.confidence == other.confidence && self.layer == other.layer
    }
}

/// Timing and cost of one decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub classification_ms: f64,
    pub handler_ms: f64,
    pub total_ms: f64,
    pub llm_calls_count: u32,
    pub fallback_used: bool,
    pub classifier_layer: Option<ClassifierLayer>,
}

/// Which gate or handler outcome caused a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStage {
    LowConfidence,
    IntentDisabled,
    RagUnavailable,
    NoHandler,
    RagEmpty,
    RuleEmpty,
}

/// A fallback transition, attributed to the config field that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub stage: FallbackStage,
    pub config_field: String,
    pub config_value: String,
    pub from_intent: IntentType,
    /// `None` when the fallback ended the decision without a handler.
    pub to_intent: Option<IntentType>,
    pub detail: String,
    pub outcome: String,
}

impl FallbackRecord {
    /// Confidence under `min_confidence`.
    pub fn low_confidence(
        confidence: f64,
        min_confidence: f64,
        from: IntentType,
        to: Option<IntentType>,
    ) -> Self {
        let outcome = match to {
            Some(intent) => format!("default_intent={}", intent),
            None => "low_confidence_strategy=ask_user".to_string(),
        };
        Self {
            stage: FallbackStage::LowConfidence,
            config_field: "min_confidence".to_string(),
            config_value: format!("{:.2}", min_confidence),
            from_intent: from,
            to_intent: to,
            detail: format!("{:.2} < {:.2}", confidence, min_confidence),
            outcome,
        }
    }

    /// Intent missing from `enabled_intents`.
    pub fn intent_disabled(enabled: &[IntentType], from: IntentType, to: IntentType) -> Self {
        let value = enabled.iter().map(IntentType::as_str).collect::<Vec<_>>().join(",");
        Self {
            stage: FallbackStage::IntentDisabled,
            config_field: "enabled_intents".to_string(),
            config_value: format!("[{}]", value),
            from_intent: from,
            to_intent: Some(to),
            detail: format!("{} not enabled", from),
            outcome: format!("default_intent={}", to),
        }
    }

    /// RAG routed but no RAG handler registered.
    pub fn rag_unavailable(policy: &str, to: Option<IntentType>) -> Self {
        Self {
            stage: FallbackStage::RagUnavailable,
            config_field: "when_rag_unavailable".to_string(),
            config_value: policy.to_string(),
            from_intent: IntentType::Rag,
            to_intent: to,
            detail: "no rag handler".to_string(),
            outcome: to.map_or_else(|| "ask_user".to_string(), |i| i.to_string()),
        }
    }

    /// No handler for the routed intent.
    pub fn no_handler(default_intent: IntentType, from: IntentType, to: IntentType) -> Self {
        Self {
            stage: FallbackStage::NoHandler,
            config_field: "default_intent".to_string(),
            config_value: default_intent.to_string(),
            from_intent: from,
            to_intent: Some(to),
            detail: format!("no handler for {}", from),
            outcome: to.to_string(),
        }
    }

    /// RAG handler produced no answer.
    pub fn rag_empty(fallback_to_direct: bool) -> Self {
        let to = fallback_to_direct.then_some(IntentType::Direct);
        Self {
            stage: FallbackStage::RagEmpty,
            config_field: "fallback_to_direct".to_string(),
            config_value: fallback_to_direct.to_string(),
            from_intent: IntentType::Rag,
            to_intent: to,
            detail: "rag returned no answer".to_string(),
            outcome: to.map_or_else(|| "no answer".to_string(), |i| i.to_string()),
        }
    }

    /// Rule handler found no rule for an intent classified as `rule`.
    pub fn rule_empty() -> Self {
        Self {
            stage: FallbackStage::RuleEmpty,
            config_field: "rules".to_string(),
            config_value: "no matching rule".to_string(),
            from_intent: IntentType::Rule,
            to_intent: Some(IntentType::Direct),
            detail: "rule handler returned no answer".to_string(),
            outcome: IntentType::Direct.to_string(),
        }
    }
}

impl fmt::Display for FallbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} gate: {} → {}", self.config_field, self.detail, self.outcome)
    }
}

/// A retrieved passage cited by a RAG answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub document_id: Option<String>,
    pub chunk_index: Option<u32>,
    pub score: f64,
}

/// The decision returned for one message. Built once per call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorResult {
    pub query: String,
    /// The intent that effectively produced the answer.
    pub intent: IntentType,
    pub answer: Option<String>,
    pub sources: Vec<Source>,
    pub rule_matched: Option<String>,
    pub tool_called: Option<String>,
    pub classification: Option<ClassificationResult>,
    pub metrics: OrchestratorMetrics,
    pub needs_clarification: bool,
    pub fallback_used: bool,
    pub fallback_from_intent: Option<IntentType>,
    pub fallbacks: Vec<FallbackRecord>,
    pub metadata: Map<String, Value>,
}

impl OrchestratorResult {
    pub fn new(query: impl Into<String>, intent: IntentType) -> Self {
        Self {
            query: query.into(),
            intent,
            answer: None,
            sources: Vec::new(),
            rule_matched: None,
            tool_called: None,
            classification: None,
            metrics: OrchestratorMetrics::default(),
            needs_clarification: false,
            fallback_used: false,
            fallback_from_intent: None,
            fallbacks: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Answer text, treating blank answers as absent.
    pub fn answer_text(&self) -> Option<&str> {
        self.answer.as_deref().filter(|a| !a.trim().is_empty())
    }

    pub fn confidence(&self) -> Option<f64> {
        self.classification.as_ref().map(|c| c.confidence)
    }

    pub fn classifier_layer(&self) -> Option<ClassifierLayer> {
        self.classification
            .as_ref()
            .map(|c| c.layer)
            .or(self.metrics.classifier_layer)
    }

    /// Flow state a flow rule asked to persist.
    ///
    /// `None` when no flow rule fired (keep the stored state);
    /// `Some(FlowContext::Inactive)` when the flow ended.
    pub fn next_flow_context(&self) -> Option<FlowContext> {
        if self.intent != IntentType::Rule {
            return None;
        }
        self.metadata.get(NEXT_FLOW_CONTEXT).map(FlowContext::from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn fallback_record_reads_like_a_gate() {
        let record = FallbackRecord::low_confidence(0.42, 0.7, IntentType::Tool, Some(IntentType::Rag));
        assert_eq!(record.to_string(), "min_confidence gate: 0.42 < 0.70 → default_intent=rag");
    }

    #[test]
    fn intent_disabled_lists_enabled_intents() {
        let record = FallbackRecord::intent_disabled(
            &[IntentType::Direct, IntentType::Rule],
            IntentType::Tool,
            IntentType::Direct,
        );
        assert_eq!(record.config_value, "[direct,rule]");
        assert_eq!(record.to_string(), "enabled_intents gate: tool not enabled → default_intent=direct");
    }

    #[test]
    fn next_flow_context_requires_rule_intent_and_key() {
        let mut result = OrchestratorResult::new("q", IntentType::Rule);
        assert_eq!(result.next_flow_context(), None);

        result.metadata.insert(NEXT_FLOW_CONTEXT.to_string(), Value::Null);
        assert_eq!(result.next_flow_context(), Some(FlowContext::Inactive));

        result.metadata.insert(
            NEXT_FLOW_CONTEXT.to_string(),
            json!({"flow_id": "f", "current_step": "s"}),
        );
        assert_eq!(result.next_flow_context(), Some(FlowContext::active("f", "s")));

        result.intent = IntentType::Direct;
        assert_eq!(result.next_flow_context(), None);
    }

    #[test]
    fn blank_answer_is_absent() {
        let mut result = OrchestratorResult::new("q", IntentType::Rag);
        result.answer = Some("  ".to_string());
        assert_eq!(result.answer_text(), None);
    }

    #[test]
    fn cache_copy_keeps_the_decision() {
        let fresh = ClassificationResult::new(IntentType::Rag, 0.8, ClassifierLayer::Llm);
        let hit = fresh.from_cache();
        assert!(hit.cached);
        assert!(hit.same_decision(&fresh));
    }

    proptest! {
        #[test]
        fn confidence_is_always_clipped(raw in proptest::num::f64::ANY) {
            let c = ClassificationResult::new(IntentType::Direct, raw, ClassifierLayer::Llm).confidence;
            prop_assert!((0.0..=1.0).contains(&c));
        }
    }
}
