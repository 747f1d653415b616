//! One handler per intent.
//!
//! Handlers never fail: provider errors are turned into an empty answer
//! (so the engine's fallbacks can apply) or a user-safe message, with the
//! error kept in `metadata.error`. Each handler counts its own model calls
//! in `metrics.llm_calls_count`.

mod direct;
mod rag;
mod rule;
mod tool;

pub use direct::DirectHandler;
pub use rag::{enrich_query, RagHandler, RAG_HISTORY_TURNS};
pub use rule::{rule_result, RuleHandler, LLM_RULE_CONFIDENCE};
pub use tool::ToolHandler;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::BotConfig;
use crate::domain::orchestrator::{ConversationTurn, IntentType, OrchestratorResult};

/// Input shared by all handlers.
#[derive(Debug, Clone, Copy)]
pub struct HandlerRequest<'a> {
    pub query: &'a str,
    pub history: &'a [ConversationTurn],
    pub platform: Option<&'a str>,
    /// A flow is in progress; rule matching must not start another one.
    pub flow_active: bool,
}

impl<'a> HandlerRequest<'a> {
    pub fn new(query: &'a str, history: &'a [ConversationTurn]) -> Self {
        Self {
            query,
            history,
            platform: None,
            flow_active: false,
        }
    }

    pub fn with_platform(mut self, platform: Option<&'a str>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_flow_active(mut self, active: bool) -> Self {
        self.flow_active = active;
        self
    }
}

#[async_trait]
pub trait IntentHandler: Send + Sync {
    fn intent(&self) -> IntentType;

    async fn handle(&self, request: &HandlerRequest<'_>) -> OrchestratorResult;
}

/// The closed set of handlers a snapshot dispatches to.
///
/// Direct is always present: it is the last resort of every fallback.
pub struct HandlerSet {
    direct: DirectHandler,
    rag: Option<RagHandler>,
    rule: Option<RuleHandler>,
    tool: Option<ToolHandler>,
}

impl HandlerSet {
    pub fn new(direct: DirectHandler) -> Self {
        Self {
            direct,
            rag: None,
            rule: None,
            tool: None,
        }
    }

    pub fn with_rag(mut self, rag: Option<RagHandler>) -> Self {
        self.rag = rag;
        self
    }

    pub fn with_rule(mut self, rule: Option<RuleHandler>) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_tool(mut self, tool: Option<ToolHandler>) -> Self {
        self.tool = tool;
        self
    }

    pub fn get(&self, intent: IntentType) -> Option<&dyn IntentHandler> {
        match intent {
            IntentType::Direct => Some(&self.direct),
            IntentType::Rag => self.rag.as_ref().map(|h| h as &dyn IntentHandler),
            IntentType::Rule => self.rule.as_ref().map(|h| h as &dyn IntentHandler),
            IntentType::Tool => self.tool.as_ref().map(|h| h as &dyn IntentHandler),
        }
    }

    pub fn has(&self, intent: IntentType) -> bool {
        self.get(intent).is_some()
    }

    pub fn direct(&self) -> &dyn IntentHandler {
        &self.direct
    }

    /// Intents with a registered handler.
    pub fn available(&self) -> Vec<IntentType> {
        IntentType::ALL.into_iter().filter(|i| self.has(*i)).collect()
    }
}

/// System prompt shared by the answering handlers.
pub fn system_prompt(config: &BotConfig) -> String {
    let mut prompt = config.persona_prompt.clone().unwrap_or_else(|| {
        format!(
            "You are {}, a helpful customer-support assistant. Reply in the language the user writes in.",
            config.bot_name
        )
    });
    if let Some(restrictions) = &config.restrictions {
        prompt.push_str("\n\nNever do the following:\n");
        prompt.push_str(restrictions);
    }
    prompt
}

/// A result for `intent` with no answer and the error in metadata.
fn failed(query: &str, intent: IntentType, error: String) -> OrchestratorResult {
    let mut result = OrchestratorResult::new(query, intent);
    result.metadata.insert("error".to_string(), Value::String(error));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_uses_persona_and_restrictions() {
        let mut config = BotConfig::default();
        assert!(system_prompt(&config).starts_with("You are Assistant,"));

        config.persona_prompt = Some("Sen Kahve Dükkanı asistanısın.".to_string());
        config.restrictions = Some("Siyaset konuşma.".to_string());
        let prompt = system_prompt(&config);
        assert!(prompt.starts_with("Sen Kahve Dükkanı asistanısın."));
        assert!(prompt.ends_with("Never do the following:\nSiyaset konuşma."));
    }
}
