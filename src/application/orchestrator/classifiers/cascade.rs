//! The three-layer cascade: pre → embedding → (cache →) LLM.

use std::sync::Arc;

use super::cache::ClassificationCache;
use super::embedding::EmbeddingClassifier;
use super::llm::{ClassificationPrompt, LlmClassifier};
use super::pre::{PreClassifier, PRE_ACCEPT_CONFIDENCE};
use crate::config::BotConfig;
use crate::domain::orchestrator::{ClassificationResult, ConversationTurn, IntentType};
use crate::domain::rules::{Rule, RuleMatcher};
use crate::ports::LlmError;

/// Triggers shown per rule in the classifier prompt.
const PROMPT_TRIGGERS_PER_RULE: usize = 5;

/// Describes active rules for the classifier prompt.
pub fn rule_descriptions(matcher: &RuleMatcher) -> Vec<String> {
    matcher.rules().map(describe_rule).collect()
}

fn describe_rule(rule: &Rule) -> String {
    let mut desc = format!("{}: {}", rule.name, rule.description);
    if !rule.trigger_patterns.is_empty() {
        let shown: Vec<&str> = rule
            .trigger_patterns
            .iter()
            .take(PROMPT_TRIGGERS_PER_RULE)
            .map(String::as_str)
            .collect();
        desc.push_str(&format!(" [triggers: {}]", shown.join(", ")));
    }
    if let Some(flow_id) = &rule.flow_id {
        match &rule.step_key {
            Some(step) => desc.push_str(&format!(" [flow={}, step={}]", flow_id, step)),
            None => desc.push_str(&format!(" [flow={}]", flow_id)),
        }
    }
    desc
}

pub struct ClassifierCascade {
    pre: PreClassifier,
    embedding: Option<Arc<EmbeddingClassifier>>,
    llm: LlmClassifier,
    cache: Arc<ClassificationCache>,
    rule_descriptions: Vec<String>,
    tool_descriptions: Vec<String>,
}

impl ClassifierCascade {
    pub fn new(pre: PreClassifier, llm: LlmClassifier, cache: Arc<ClassificationCache>) -> Self {
        Self {
            pre,
            embedding: None,
            llm,
            cache,
            rule_descriptions: Vec::new(),
            tool_descriptions: Vec::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Option<Arc<EmbeddingClassifier>>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_descriptions(mut self, rules: Vec<String>, tools: Vec<String>) -> Self {
        self.rule_descriptions = rules;
        self.tool_descriptions = tools;
        self
    }

    pub fn has_embedding_layer(&self) -> bool {
        self.embedding.is_some()
    }

    /// Classifies `query`, short-circuiting on the first confident layer.
    ///
    /// Only an LLM-layer failure is returned as an error; embedding
    /// failures fall through to the LLM. Verdicts for history-free queries
    /// are cached.
    pub async fn classify(
        &self,
        query: &str,
        history: &[ConversationTurn],
        last_intent: Option<IntentType>,
        config: &BotConfig,
    ) -> Result<ClassificationResult, LlmError> {
        if let Some(pre) = self.pre.classify(query) {
            if pre.confidence >= PRE_ACCEPT_CONFIDENCE {
                return Ok(pre);
            }
        }

        if let Some(embedding) = &self.embedding {
            match embedding.classify(query).await {
                Ok(result) if result.confidence >= config.embedding_confidence_threshold => {
                    return Ok(result);
                }
                Ok(result) => {
                    tracing::debug!(
                        intent = %result.intent,
                        confidence = result.confidence,
                        threshold = config.embedding_confidence_threshold,
                        "Embedding verdict below threshold"
                    );
                }
                Err(e) => {
                    tracing::warn!("Embedding classifier failed, falling through to LLM: {}", e);
                }
            }
        }

        let use_cache = history.is_empty();
        if use_cache {
            if let Some(hit) = self.cache.get(query).await {
                return Ok(hit);
            }
        }

        let window = config.history_limit();
        let visible = &history[history.len().saturating_sub(window)..];
        let prompt = ClassificationPrompt {
            query,
            rule_descriptions: &self.rule_descriptions,
            tool_descriptions: &self.tool_descriptions,
            history: visible,
            last_intent,
            template: config.classification_prompt_override.as_deref(),
        };
        let result = self.llm.classify(&prompt, config.llm_timeout_seconds).await?;

        if use_cache {
            self.cache.put(query, result.clone()).await;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockEmbeddingProvider, MockLlmProvider};
    use crate::domain::orchestrator::ClassifierLayer;
    use crate::domain::rules::ChoiceMatching;

    fn cascade(llm: Arc<MockLlmProvider>) -> ClassifierCascade {
        ClassifierCascade::new(
            PreClassifier::new(vec!["fiyat".to_string()], Vec::new()),
            LlmClassifier::new(llm),
            Arc::new(ClassificationCache::default()),
        )
    }

    #[tokio::test]
    async fn pre_layer_short_circuits() {
        let llm = Arc::new(MockLlmProvider::new());
        let result = cascade(llm.clone())
            .classify("Fiyat?", &[], None, &BotConfig::default())
            .await
            .unwrap();

        assert_eq!(result.layer, ClassifierLayer::Pre);
        assert_eq!(result.intent, IntentType::Rule);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn warm_cache_skips_llm() {
        let llm = Arc::new(MockLlmProvider::new().with_response(r#"{"intent":"rag","confidence":0.91}"#));
        let cascade = cascade(llm.clone());
        let config = BotConfig::default();

        let first = cascade.classify("İade süresi?", &[], None, &config).await.unwrap();
        let second = cascade.classify("İade süresi?", &[], None, &config).await.unwrap();

        assert!(first.same_decision(&second));
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn history_bypasses_cache() {
        let llm = Arc::new(
            MockLlmProvider::new()
                .with_response(r#"{"intent":"rag","confidence":0.9}"#)
                .with_response(r#"{"intent":"direct","confidence":0.9}"#),
        );
        let cascade = cascade(llm.clone());
        let config = BotConfig::default();
        let history = vec![ConversationTurn::user("önceki"), ConversationTurn::assistant("cevap")];

        cascade.classify("devam", &history, None, &config).await.unwrap();
        let second = cascade.classify("devam", &history, None, &config).await.unwrap();

        assert_eq!(second.intent, IntentType::Direct);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn confident_embedding_skips_llm() {
        let llm = Arc::new(MockLlmProvider::new());
        let embedder = MockEmbeddingProvider::new()
            .with_vector("belge", vec![1.0, 0.0])
            .with_vector("dokümanda ne var", vec![1.0, 0.05]);
        let embedding = EmbeddingClassifier::build(
            Arc::new(embedder),
            vec![(IntentType::Rag, vec!["belge".to_string()])],
        )
        .await
        .unwrap();

        let result = cascade(llm.clone())
            .with_embedding(Some(Arc::new(embedding)))
            .classify("dokümanda ne var", &[], None, &BotConfig::default())
            .await
            .unwrap();

        assert_eq!(result.layer, ClassifierLayer::Embedding);
        assert_eq!(result.intent, IntentType::Rag);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn embedding_failure_falls_through_to_llm() {
        let llm = Arc::new(MockLlmProvider::new().with_response(r#"{"intent":"direct","confidence":0.8}"#));
        let embedder = MockEmbeddingProvider::new().with_vector("x", vec![1.0]);
        let embedding = EmbeddingClassifier::build(
            Arc::new(embedder.clone()),
            vec![(IntentType::Rag, vec!["x".to_string()])],
        )
        .await
        .unwrap();
        embedder.set_failing(true);

        let result = cascade(llm)
            .with_embedding(Some(Arc::new(embedding)))
            .classify("selam", &[], None, &BotConfig::default())
            .await
            .unwrap();
        assert_eq!(result.layer, ClassifierLayer::Llm);
    }

    #[tokio::test]
    async fn llm_failure_is_terminal() {
        let llm = Arc::new(MockLlmProvider::new().with_error(LlmError::timeout(60.0)));
        let result = cascade(llm)
            .classify("selam", &[], None, &BotConfig::default())
            .await;
        assert!(matches!(result, Err(LlmError::Timeout { .. })));
    }

    #[tokio::test]
    async fn prompt_history_is_limited_to_configured_turns() {
        let llm = Arc::new(MockLlmProvider::new().with_response(r#"{"intent":"direct","confidence":0.8}"#));
        let config = BotConfig {
            max_conversation_turns: 1,
            ..Default::default()
        };
        let history = vec![
            ConversationTurn::user("eski soru"),
            ConversationTurn::assistant("eski cevap"),
            ConversationTurn::user("yeni soru"),
            ConversationTurn::assistant("yeni cevap"),
        ];

        cascade(llm.clone()).classify("devam", &history, None, &config).await.unwrap();

        let prompt = llm.get_calls()[0].last_user_content().unwrap_or_default();
        assert!(prompt.contains("yeni soru"));
        assert!(!prompt.contains("eski soru"));
    }

    #[test]
    fn rule_description_includes_triggers_and_flow() {
        let rules = vec![
            Rule::new("Fiyat", "Fiyatlar")
                .with_description("fiyat listesi")
                .with_triggers(["a", "b", "c", "d", "e", "f"]),
            Rule::new("Menü", "1) Fiyat").in_flow("satis", "start"),
        ];
        let descriptions = rule_descriptions(&RuleMatcher::new(rules, ChoiceMatching::default()));

        assert_eq!(descriptions[0], "Fiyat: fiyat listesi [triggers: a, b, c, d, e]");
        assert_eq!(descriptions[1], "Menü:  [flow=satis, step=start]");
    }
}
