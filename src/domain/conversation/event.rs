//! Append-only sub-events recorded with an assistant message.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::domain::foundation::{EventId, MessageId, Timestamp};
use crate::domain::orchestrator::OrchestratorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEventType {
    ClassificationResult,
    RuleMatched,
    FallbackTriggered,
    LowConfidence,
    RagSearch,
    ToolCalled,
    Metrics,
}

impl MessageEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageEventType::ClassificationResult => "classification_result",
            MessageEventType::RuleMatched => "rule_matched",
            MessageEventType::FallbackTriggered => "fallback_triggered",
            MessageEventType::LowConfidence => "low_confidence",
            MessageEventType::RagSearch => "rag_search",
            MessageEventType::ToolCalled => "tool_called",
            MessageEventType::Metrics => "metrics",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "classification_result" => Some(MessageEventType::ClassificationResult),
            "rule_matched" => Some(MessageEventType::RuleMatched),
            "fallback_triggered" => Some(MessageEventType::FallbackTriggered),
            "low_confidence" => Some(MessageEventType::LowConfidence),
            "rag_search" => Some(MessageEventType::RagSearch),
            "tool_called" => Some(MessageEventType::ToolCalled),
            "metrics" => Some(MessageEventType::Metrics),
            _ => None,
        }
    }
}

impl fmt::Display for MessageEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: EventId,
    pub message_id: MessageId,
    pub event_type: MessageEventType,
    pub data: Value,
    pub created_at: Timestamp,
}

impl MessageEvent {
    pub fn new(message_id: MessageId, event_type: MessageEventType, data: Value) -> Self {
        Self {
            id: EventId::new(),
            message_id,
            event_type,
            data,
            created_at: Timestamp::now(),
        }
    }

    /// Derives the structured events describing how `result` was produced.
    pub fn from_result(message_id: MessageId, result: &OrchestratorResult) -> Vec<MessageEvent> {
        let mut events = Vec::new();
        let mut push = |event_type, data| events.push(MessageEvent::new(message_id, event_type, data));

        if let Some(c) = &result.classification {
            push(
                MessageEventType::ClassificationResult,
                json!({
                    "intent": c.intent,
                    "confidence": c.confidence,
                    "layer": c.layer,
                    "reasoning": c.reasoning,
                    "cached": c.cached,
                }),
            );
        }

        if let Some(rule) = &result.rule_matched {
            push(MessageEventType::RuleMatched, json!({ "rule_name": rule }));
        }

        for fallback in &result.fallbacks {
            push(
                MessageEventType::FallbackTriggered,
                json!({
                    "stage": fallback.stage,
                    "from_intent": fallback.from_intent,
                    "to_intent": fallback.to_intent,
                    "config_field": fallback.config_field,
                    "config_value": fallback.config_value,
                    "reason": fallback.to_string(),
                }),
            );
        }

        if result.needs_clarification {
            push(
                MessageEventType::LowConfidence,
                json!({ "confidence": result.confidence() }),
            );
        }

        if !result.sources.is_empty() {
            push(
                MessageEventType::RagSearch,
                json!({ "source_count": result.sources.len() }),
            );
        }

        if let Some(tool) = &result.tool_called {
            push(
                MessageEventType::ToolCalled,
                json!({
                    "tool_name": tool,
                    "arguments": result.metadata.get("tool_arguments"),
                }),
            );
        }

        let m = &result.metrics;
        push(
            MessageEventType::Metrics,
            json!({
                "classification_ms": m.classification_ms,
                "handler_ms": m.handler_ms,
                "total_ms": m.total_ms,
                "llm_calls_count": m.llm_calls_count,
            }),
        );

        events
    }
}
