//! Rule handler: trigger matching first, then a model pick among
//! standalone rules.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{HandlerRequest, IntentHandler};
use crate::application::orchestrator::classifiers::strip_code_fence;
use crate::application::orchestrator::deadline::complete_within;
use crate::config::BotConfig;
use crate::domain::foundation::RuleId;
use crate::domain::orchestrator::{IntentType, OrchestratorResult, NEXT_FLOW_CONTEXT};
use crate::domain::rules::{FlowContext, RuleMatch, RuleMatcher};
use crate::ports::{CompletionRequest, LlmProvider};

/// Minimum model confidence for a model-picked rule.
pub const LLM_RULE_CONFIDENCE: f64 = 0.7;

const RULE_PICK_PROMPT: &str = "You are a rule matcher. Given the user message and a list of rules, \
determine which rule (if any) best matches the user's intent.\n\n\
Rules:\n{rules}\n\n\
User message: \"{query}\"\n\n\
If a rule matches, respond with ONLY the JSON: {\"rule_id\": \"<id>\", \"confidence\": 0.0-1.0}\n\
If no rule matches, respond with: {\"rule_id\": null, \"confidence\": 0.0}";

/// Builds the result for a rule match.
///
/// Flow matches always carry [`NEXT_FLOW_CONTEXT`] (null when the flow
/// ended); standalone matches leave it out so stored flow state is kept.
pub fn rule_result(query: &str, matched: &RuleMatch) -> OrchestratorResult {
    let mut result = OrchestratorResult::new(query, IntentType::Rule);
    result.answer = Some(matched.answer.clone());
    result.rule_matched = Some(matched.rule_name.clone());
    result
        .metadata
        .insert("rule_id".to_string(), matched.rule_id.to_string().into());
    result
        .metadata
        .insert("match_stage".to_string(), matched.stage.as_str().into());
    if let Some(next) = &matched.next_flow {
        result
            .metadata
            .insert(NEXT_FLOW_CONTEXT.to_string(), next.to_value());
    }
    result
}

#[derive(Debug, Deserialize)]
struct RulePick {
    rule_id: Option<String>,
    #[serde(default)]
    confidence: f64,
}

pub struct RuleHandler {
    matcher: Arc<RuleMatcher>,
    llm: Option<Arc<dyn LlmProvider>>,
    config: Arc<BotConfig>,
}

impl RuleHandler {
    pub fn new(matcher: Arc<RuleMatcher>, config: Arc<BotConfig>) -> Self {
        Self {
            matcher,
            llm: None,
            config,
        }
    }

    /// Enables the model pick when no trigger matches.
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    fn prompt(&self, query: &str) -> Option<String> {
        let lines: Vec<String> = self
            .matcher
            .standalone_rules()
            .map(|r| format!("- id={} | name=\"{}\" | description=\"{}\"", r.id, r.name, r.description))
            .collect();
        if lines.is_empty() {
            return None;
        }
        Some(
            RULE_PICK_PROMPT
                .replace("{rules}", &lines.join("\n"))
                .replace("{query}", query),
        )
    }

    /// Asks the model for a rule id. Any failure is a miss.
    async fn pick(&self, llm: &dyn LlmProvider, prompt: String) -> Option<RuleMatch> {
        let request = CompletionRequest::prompt(prompt).with_temperature(0.0);
        let response = match complete_within(llm, request, self.config.llm_timeout_seconds).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Rule selection by model failed: {}", e);
                return None;
            }
        };

        let pick: RulePick = match serde_json::from_str(&strip_code_fence(&response.content)) {
            Ok(pick) => pick,
            Err(e) => {
                tracing::debug!("Unparseable rule pick: {}", e);
                return None;
            }
        };
        if pick.confidence < LLM_RULE_CONFIDENCE {
            return None;
        }
        let rule_id: RuleId = pick.rule_id?.trim().parse().ok()?;
        self.matcher.select(rule_id)
    }
}

#[async_trait]
impl IntentHandler for RuleHandler {
    fn intent(&self) -> IntentType {
        IntentType::Rule
    }

    async fn handle(&self, request: &HandlerRequest<'_>) -> OrchestratorResult {
        let triggered = if request.flow_active {
            self.matcher.match_standalone_query(request.query, request.platform)
        } else {
            self.matcher
                .match_query(request.query, &FlowContext::Inactive, request.platform)
        };
        if let Some(matched) = triggered {
            return rule_result(request.query, &matched);
        }

        let (Some(llm), Some(prompt)) = (&self.llm, self.prompt(request.query)) else {
            return OrchestratorResult::new(request.query, IntentType::Rule);
        };

        let mut result = match self.pick(llm.as_ref(), prompt).await {
            Some(matched) => rule_result(request.query, &matched),
            None => OrchestratorResult::new(request.query, IntentType::Rule),
        };
        result.metrics.llm_calls_count = 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockLlmProvider;
    use crate::domain::rules::{ChoiceMatching, Rule};
    use crate::ports::LlmError;

    fn matcher(rules: Vec<Rule>) -> Arc<RuleMatcher> {
        Arc::new(RuleMatcher::new(rules, ChoiceMatching::default()))
    }

    #[test]
    fn flow_result_always_carries_next_context() {
        let matched = RuleMatch {
            rule_id: RuleId::new(),
            rule_name: "bitti".to_string(),
            answer: "Teşekkürler".to_string(),
            stage: crate::domain::rules::MatchStage::Transition,
            next_flow: Some(FlowContext::Inactive),
        };
        let result = rule_result("tamam", &matched);
        assert!(result.metadata[NEXT_FLOW_CONTEXT].is_null());
        assert_eq!(result.next_flow_context(), Some(FlowContext::Inactive));

        let standalone = RuleMatch {
            next_flow: None,
            ..matched
        };
        assert!(!rule_result("tamam", &standalone)
            .metadata
            .contains_key(NEXT_FLOW_CONTEXT));
    }

    #[tokio::test]
    async fn trigger_match_skips_model() {
        let llm = Arc::new(MockLlmProvider::new());
        let handler = RuleHandler::new(
            matcher(vec![Rule::new("saatler", "09:00-18:00 açığız").with_triggers(["saat"])]),
            Arc::new(BotConfig::default()),
        )
        .with_llm(llm.clone());

        let result = handler.handle(&HandlerRequest::new("kaçta açıksınız saat", &[])).await;

        assert_eq!(result.answer.as_deref(), Some("09:00-18:00 açığız"));
        assert_eq!(result.rule_matched.as_deref(), Some("saatler"));
        assert_eq!(llm.call_count(), 0);
        assert_eq!(result.metrics.llm_calls_count, 0);
    }

    #[tokio::test]
    async fn active_flow_keeps_entry_rules_out() {
        let handler = RuleHandler::new(
            matcher(vec![
                Rule::new("şikayet", "Şikayetinizi yazın")
                    .with_triggers(["şikayet"])
                    .in_flow("sikayet", "start")
                    .with_next_steps([("*", "kayit")]),
                Rule::new("saatler", "09:00-18:00 açığız").with_triggers(["saat"]),
            ]),
            Arc::new(BotConfig::default()),
        );

        let entry = handler.handle(&HandlerRequest::new("şikayet", &[])).await;
        assert_eq!(entry.rule_matched.as_deref(), Some("şikayet"));

        let in_flow = HandlerRequest::new("şikayet", &[]).with_flow_active(true);
        assert!(handler.handle(&in_flow).await.answer_text().is_none());

        let standalone = HandlerRequest::new("saat kaç", &[]).with_flow_active(true);
        let result = handler.handle(&standalone).await;
        assert_eq!(result.rule_matched.as_deref(), Some("saatler"));
        assert!(result.next_flow_context().is_none());
    }

    #[tokio::test]
    async fn model_pick_above_threshold_matches() {
        let rule = Rule::new("kargo", "Kargo 3 günde gelir")
            .with_description("Shipping time questions")
            .with_triggers(["kargo"]);
        let id = rule.id;
        let llm = Arc::new(
            MockLlmProvider::new()
                .with_response(format!("```json\n{{\"rule_id\": \"{}\", \"confidence\": 0.9}}\n```", id)),
        );
        let handler = RuleHandler::new(matcher(vec![rule]), Arc::new(BotConfig::default()))
            .with_llm(llm.clone());

        let result = handler.handle(&HandlerRequest::new("paketim ne zaman gelir", &[])).await;

        assert_eq!(result.answer.as_deref(), Some("Kargo 3 günde gelir"));
        assert_eq!(result.metadata["match_stage"], "selected");
        assert_eq!(result.metrics.llm_calls_count, 1);
        let prompt = llm.get_calls()[0].last_user_content().unwrap();
        assert!(prompt.contains(&format!("- id={} | name=\"kargo\"", id)));
        assert!(prompt.contains("User message: \"paketim ne zaman gelir\""));
    }

    #[tokio::test]
    async fn low_confidence_or_unknown_id_is_a_miss() {
        let rule = Rule::new("kargo", "Kargo 3 günde gelir").with_triggers(["kargo"]);
        let id = rule.id;
        let llm = Arc::new(
            MockLlmProvider::new()
                .with_response(format!("{{\"rule_id\": \"{}\", \"confidence\": 0.5}}", id))
                .with_response(format!("{{\"rule_id\": \"{}\", \"confidence\": 0.95}}", RuleId::new()))
                .with_response("{\"rule_id\": null, \"confidence\": 0.0}"),
        );
        let handler = RuleHandler::new(matcher(vec![rule]), Arc::new(BotConfig::default()))
            .with_llm(llm.clone());

        for _ in 0..3 {
            let result = handler.handle(&HandlerRequest::new("paketim nerede", &[])).await;
            assert!(result.answer_text().is_none());
            assert_eq!(result.metrics.llm_calls_count, 1);
        }
    }

    #[tokio::test]
    async fn model_error_is_a_miss() {
        let llm = Arc::new(MockLlmProvider::new().with_error(LlmError::unavailable("down")));
        let handler = RuleHandler::new(
            matcher(vec![Rule::new("kargo", "Kargo 3 günde gelir").with_triggers(["kargo"])]),
            Arc::new(BotConfig::default()),
        )
        .with_llm(llm);

        let result = handler.handle(&HandlerRequest::new("paketim nerede", &[])).await;
        assert!(result.answer_text().is_none());
        assert_eq!(result.intent, IntentType::Rule);
    }

    #[tokio::test]
    async fn flow_rules_are_not_offered_to_model() {
        let llm = Arc::new(MockLlmProvider::new());
        let handler = RuleHandler::new(
            matcher(vec![Rule::new("adım", "Adınız?")
                .with_triggers(["başvuru"])
                .in_flow("apply", "name")]),
            Arc::new(BotConfig::default()),
        )
        .with_llm(llm.clone());

        let result = handler.handle(&HandlerRequest::new("merhaba", &[])).await;
        assert!(result.answer_text().is_none());
        assert_eq!(llm.call_count(), 0);
    }
}
