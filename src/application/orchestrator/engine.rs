//! Decision engine.
//!
//! Every call to [`Orchestrator::process`] captures one immutable
//! [`OrchestratorSnapshot`] (config, rules, tools, handlers) and runs the
//! decision steps against it:
//!
//! 0. active flow → flow rules only
//! 1. `rules_first` → standalone rules, then flow entries
//! 2. classifier cascade
//! 3. confidence gate, then the enabled-intents gate
//! 4. dispatch, with RAG-unavailable and no-handler rerouting
//! 5. one re-dispatch to Direct when RAG or Rule produced nothing
//! 6. classification, fallbacks and metrics
//!
//! Reloads build a new snapshot and swap it in; calls already running keep
//! the snapshot they started with.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

use super::classifiers::{
    default_examples, rule_descriptions, ClassificationCache, ClassifierCascade,
    EmbeddingClassifier, LlmClassifier, PreClassifier,
};
use super::error::OrchestratorError;
use super::handlers::{
    rule_result, DirectHandler, HandlerRequest, HandlerSet, RagHandler, RuleHandler, ToolHandler,
};
use super::tools::ToolRegistry;
use crate::config::BotConfig;
use crate::domain::orchestrator::{
    ClassificationResult, ClassifierLayer, ConversationTurn, FallbackRecord, IntentType,
    LowConfidenceStrategy, OrchestratorResult, RagUnavailablePolicy,
};
use crate::domain::rules::{FlowContext, Rule, RuleMatcher};
use crate::ports::{EmbeddingProvider, LlmProvider, RetrievalBackend, RuleRepository};

/// Handler invocations allowed after the first one.
pub const MAX_REDISPATCHES: usize = 1;

/// Default number of passages retrieved per RAG answer.
pub const DEFAULT_TOP_K: usize = 5;

/// One message to decide on.
#[derive(Debug, Clone)]
pub struct ProcessRequest<'a> {
    pub query: &'a str,
    pub history: &'a [ConversationTurn],
    pub last_intent: Option<IntentType>,
    pub flow: FlowContext,
    pub platform: Option<&'a str>,
}

impl<'a> ProcessRequest<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            history: &[],
            last_intent: None,
            flow: FlowContext::Inactive,
            platform: None,
        }
    }

    pub fn with_history(mut self, history: &'a [ConversationTurn]) -> Self {
        self.history = history;
        self
    }

    pub fn with_last_intent(mut self, intent: Option<IntentType>) -> Self {
        self.last_intent = intent;
        self
    }

    pub fn with_flow(mut self, flow: FlowContext) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_platform(mut self, platform: Option<&'a str>) -> Self {
        self.platform = platform;
        self
    }
}

/// Everything one decision reads. Never mutated after construction.
pub struct OrchestratorSnapshot {
    config: Arc<BotConfig>,
    matcher: Arc<RuleMatcher>,
    tools: Arc<ToolRegistry>,
    cascade: ClassifierCascade,
    handlers: HandlerSet,
}

impl OrchestratorSnapshot {
    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn handlers(&self) -> &HandlerSet {
        &self.handlers
    }

    pub fn has_embedding_layer(&self) -> bool {
        self.cascade.has_embedding_layer()
    }
}

/// Collaborators a snapshot is built from.
struct Parts {
    config: BotConfig,
    llm: Arc<dyn LlmProvider>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    retrieval: Option<Arc<dyn RetrievalBackend>>,
    embedding: Option<Arc<EmbeddingClassifier>>,
    examples: Vec<(IntentType, Vec<String>)>,
    rag_signals: Option<Vec<String>>,
    rules: Vec<Rule>,
    tools: ToolRegistry,
    top_k: usize,
}

impl Parts {
    fn snapshot(&self, cache: &Arc<ClassificationCache>) -> OrchestratorSnapshot {
        let config = Arc::new(self.config.clone());
        let matcher = Arc::new(RuleMatcher::new(self.rules.clone(), config.choice_matching));
        let tools = Arc::new(self.tools.clone());

        let mut pre = PreClassifier::new(matcher.keywords(), tools.triggers());
        if let Some(signals) = &self.rag_signals {
            pre = pre.with_rag_signals(signals.clone());
        }
        let cascade = ClassifierCascade::new(pre, LlmClassifier::new(self.llm.clone()), cache.clone())
            .with_embedding(self.embedding.clone())
            .with_descriptions(rule_descriptions(&matcher), tools.descriptions());

        let rag = match (&self.embedder, &self.retrieval) {
            (Some(embedder), Some(retrieval)) => Some(RagHandler::new(
                embedder.clone(),
                retrieval.clone(),
                self.llm.clone(),
                config.clone(),
                self.top_k,
            )),
            _ => None,
        };
        let rule = (!matcher.is_empty())
            .then(|| RuleHandler::new(matcher.clone(), config.clone()).with_llm(self.llm.clone()));
        let tool = tools
            .has_enabled()
            .then(|| ToolHandler::new(tools.clone(), self.llm.clone(), config.clone()));

        let handlers = HandlerSet::new(DirectHandler::new(self.llm.clone(), config.clone()))
            .with_rag(rag)
            .with_rule(rule)
            .with_tool(tool);

        tracing::info!(
            rules = self.rules.len(),
            tools = self.tools.names().len(),
            handlers = ?handlers.available(),
            embedding_layer = cascade.has_embedding_layer(),
            "Orchestrator snapshot built"
        );

        OrchestratorSnapshot {
            config,
            matcher,
            tools,
            cascade,
            handlers,
        }
    }

    async fn build_embedding(&mut self) {
        self.embedding = match &self.embedder {
            Some(embedder) => match EmbeddingClassifier::build(embedder.clone(), self.examples.clone()).await {
                Ok(classifier) => Some(Arc::new(classifier)),
                Err(e) => {
                    tracing::warn!("Embedding classifier disabled: {}", e);
                    None
                }
            },
            None => None,
        };
    }
}

/// Builds an [`Orchestrator`]. Only the LLM provider is required.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: BotConfig,
    llm: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    retrieval: Option<Arc<dyn RetrievalBackend>>,
    examples: Option<Vec<(IntentType, Vec<String>)>>,
    rag_signals: Option<Vec<String>>,
    rules: Vec<Rule>,
    tools: ToolRegistry,
    top_k: Option<usize>,
    cache: Option<Arc<ClassificationCache>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: BotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Enables the embedding layer and, together with a retrieval backend,
    /// the RAG handler.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalBackend>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    /// Replaces the embedding layer's example utterances.
    pub fn with_examples(mut self, examples: Vec<(IntentType, Vec<String>)>) -> Self {
        self.examples = Some(examples);
        self
    }

    pub fn with_rag_signals(mut self, signals: Vec<String>) -> Self {
        self.rag_signals = Some(signals);
        self
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_cache(mut self, cache: Arc<ClassificationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let llm = self
            .llm
            .ok_or_else(|| OrchestratorError::configuration("an LLM provider is required"))?;
        self.config
            .validate()
            .map_err(|e| OrchestratorError::configuration(e.to_string()))?;
        if self.retrieval.is_some() && self.embedder.is_none() {
            tracing::warn!("Retrieval backend configured without an embedding provider; RAG disabled");
        }

        let mut parts = Parts {
            config: self.config,
            llm,
            embedder: self.embedder,
            retrieval: self.retrieval,
            embedding: None,
            examples: self.examples.unwrap_or_else(default_examples),
            rag_signals: self.rag_signals,
            rules: self.rules,
            tools: self.tools,
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
        };
        parts.build_embedding().await;

        let cache = self.cache.unwrap_or_default();
        let snapshot = Arc::new(parts.snapshot(&cache));
        Ok(Orchestrator {
            current: RwLock::new(snapshot),
            parts: Mutex::new(parts),
            cache,
        })
    }
}

/// The decision engine.
pub struct Orchestrator {
    current: RwLock<Arc<OrchestratorSnapshot>>,
    parts: Mutex<Parts>,
    cache: Arc<ClassificationCache>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// The snapshot new calls will use.
    pub async fn snapshot(&self) -> Arc<OrchestratorSnapshot> {
        self.current.read().await.clone()
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    /// Decides how to answer one message.
    ///
    /// # Errors
    ///
    /// Only a failure of the LLM classifier layer is returned; every other
    /// failure becomes an answer or a fallback.
    pub async fn process(&self, request: ProcessRequest<'_>) -> Result<OrchestratorResult, OrchestratorError> {
        let started = Instant::now();
        let snapshot = self.snapshot().await;
        let config = snapshot.config.as_ref();
        let query = request.query;

        // 0. active flow
        if request.flow.is_active() && !snapshot.matcher.is_empty() {
            if let Some(matched) = snapshot.matcher.match_query(query, &request.flow, request.platform) {
                tracing::info!(rule = %matched.rule_name, stage = matched.stage.as_str(), "Flow rule matched");
                return Ok(finish_rule(rule_result(query, &matched), ClassifierLayer::FlowRule, started));
            }
            tracing::debug!(flow = ?request.flow.flow_id(), "No flow rule matched, falling through");
        }

        // 1. rules first; under an active flow only standalone rules may answer
        if config.rules_first && !snapshot.matcher.is_empty() {
            let matched = if request.flow.is_active() {
                snapshot.matcher.match_standalone_query(query, request.platform)
            } else {
                snapshot
                    .matcher
                    .match_query(query, &FlowContext::Inactive, request.platform)
            };
            if let Some(matched) = matched {
                tracing::info!(rule = %matched.rule_name, stage = matched.stage.as_str(), "Rule matched before classification");
                return Ok(finish_rule(rule_result(query, &matched), ClassifierLayer::RulesFirst, started));
            }
        }

        // 2. classify
        let classify_started = Instant::now();
        let classification = match snapshot
            .cascade
            .classify(query, request.history, request.last_intent, config)
            .await
        {
            Ok(classification) => classification,
            Err(e) => {
                tracing::error!("Intent classification failed: {}", e);
                return Err(OrchestratorError::Classification(e));
            }
        };
        let classification_ms = elapsed_ms(classify_started);
        let mut llm_calls = u32::from(classification.layer == ClassifierLayer::Llm && !classification.cached);

        tracing::info!(
            intent = %classification.intent,
            confidence = classification.confidence,
            layer = classification.layer.as_str(),
            cached = classification.cached,
            "Intent classified"
        );

        let mut fallbacks = Vec::new();
        let mut intent = classification.intent;

        // 3. confidence gate
        if classification.confidence < config.min_confidence {
            match config.low_confidence_strategy {
                LowConfidenceStrategy::AskUser => {
                    fallbacks.push(FallbackRecord::low_confidence(
                        classification.confidence,
                        config.min_confidence,
                        intent,
                        None,
                    ));
                    let mut result = OrchestratorResult::new(query, intent);
                    result.answer = Some(config.messages.clarification.clone());
                    result.needs_clarification = true;
                    return Ok(finish(result, classification, fallbacks, llm_calls, classification_ms, 0.0, started));
                }
                LowConfidenceStrategy::Fallback => {
                    fallbacks.push(FallbackRecord::low_confidence(
                        classification.confidence,
                        config.min_confidence,
                        intent,
                        Some(config.default_intent),
                    ));
                    intent = config.default_intent;
                }
            }
        }

        // 3b. enabled intents
        if !config.is_enabled(intent) {
            fallbacks.push(FallbackRecord::intent_disabled(
                &config.enabled_intents,
                intent,
                config.default_intent,
            ));
            intent = config.default_intent;
        }

        // 4. dispatch
        if intent == IntentType::Rag && !snapshot.handlers.has(IntentType::Rag) {
            match config.when_rag_unavailable {
                RagUnavailablePolicy::Direct => {
                    fallbacks.push(FallbackRecord::rag_unavailable(
                        RagUnavailablePolicy::Direct.as_str(),
                        Some(IntentType::Direct),
                    ));
                    intent = IntentType::Direct;
                }
                RagUnavailablePolicy::AskUser => {
                    fallbacks.push(FallbackRecord::rag_unavailable(
                        RagUnavailablePolicy::AskUser.as_str(),
                        None,
                    ));
                    let mut result = OrchestratorResult::new(query, IntentType::Rag);
                    result.answer = Some(config.messages.rag_unavailable.clone());
                    result.needs_clarification = true;
                    return Ok(finish(result, classification, fallbacks, llm_calls, classification_ms, 0.0, started));
                }
            }
        }

        if !snapshot.handlers.has(intent) {
            let to = if snapshot.handlers.has(config.default_intent) {
                config.default_intent
            } else {
                IntentType::Direct
            };
            fallbacks.push(FallbackRecord::no_handler(config.default_intent, intent, to));
            intent = to;
        }

        let handler_request = HandlerRequest::new(query, request.history)
            .with_platform(request.platform)
            .with_flow_active(request.flow.is_active());
        let handler_started = Instant::now();
        let handler = snapshot
            .handlers
            .get(intent)
            .unwrap_or_else(|| snapshot.handlers.direct());
        let mut result = handler.handle(&handler_request).await;
        llm_calls += result.metrics.llm_calls_count;

        // 5. empty-answer fallback
        let mut redispatches = 0;
        if result.answer_text().is_none() && redispatches < MAX_REDISPATCHES {
            let record = match intent {
                IntentType::Rag => Some(FallbackRecord::rag_empty(config.fallback_to_direct)),
                IntentType::Rule => Some(FallbackRecord::rule_empty()),
                _ => None,
            };
            if let Some(record) = record {
                let to = record.to_intent;
                fallbacks.push(record);
                if to == Some(IntentType::Direct) {
                    redispatches += 1;
                    let mut direct = snapshot.handlers.direct().handle(&handler_request).await;
                    llm_calls += direct.metrics.llm_calls_count;
                    direct.fallback_from_intent = Some(intent);
                    result = direct;
                }
            }
        }
        debug_assert!(redispatches <= MAX_REDISPATCHES);
        let handler_ms = elapsed_ms(handler_started);

        if result.fallback_from_intent.is_none() && result.intent != classification.intent {
            result.fallback_from_intent = Some(classification.intent);
        }

        // 6. metrics
        Ok(finish(result, classification, fallbacks, llm_calls, classification_ms, handler_ms, started))
    }

    /// Replaces the bot config. Rules are recompiled with its matching mode.
    pub async fn reload_config(&self, config: BotConfig) -> Result<(), OrchestratorError> {
        config
            .validate()
            .map_err(|e| OrchestratorError::configuration(e.to_string()))?;
        self.rebuild(|parts| parts.config = config).await;
        tracing::info!("Bot config reloaded");
        Ok(())
    }

    pub async fn reload_rules(&self, rules: Vec<Rule>) {
        let count = rules.len();
        self.rebuild(|parts| parts.rules = rules).await;
        tracing::info!(rules = count, "Rules reloaded");
    }

    /// Reloads active rules from `repository`. Returns how many were loaded.
    pub async fn reload_rules_from(&self, repository: &dyn RuleRepository) -> Result<usize, OrchestratorError> {
        let rules = repository.list_active().await?;
        let count = rules.len();
        self.reload_rules(rules).await;
        Ok(count)
    }

    pub async fn reload_llm(&self, llm: Arc<dyn LlmProvider>) {
        self.rebuild(|parts| parts.llm = llm).await;
        tracing::info!("LLM provider reloaded");
    }

    /// Swaps the embedding provider and retrieval backend. The embedding
    /// layer is rebuilt; the RAG handler exists only when both are set.
    pub async fn reload_retrieval(
        &self,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        retrieval: Option<Arc<dyn RetrievalBackend>>,
    ) {
        let mut parts = self.parts.lock().await;
        parts.embedder = embedder;
        parts.retrieval = retrieval;
        parts.build_embedding().await;
        self.install(&parts).await;
        tracing::info!("Retrieval reloaded");
    }

    /// Enables or disables a registered tool. Returns false for unknown tools.
    pub async fn set_tool_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut parts = self.parts.lock().await;
        if !parts.tools.set_enabled(name, enabled) {
            return false;
        }
        self.install(&parts).await;
        true
    }

    async fn rebuild(&self, change: impl FnOnce(&mut Parts)) {
        let mut parts = self.parts.lock().await;
        change(&mut parts);
        self.install(&parts).await;
    }

    /// Publishes a new snapshot. Cached verdicts may no longer hold.
    async fn install(&self, parts: &Parts) {
        let snapshot = Arc::new(parts.snapshot(&self.cache));
        self.cache.clear().await;
        *self.current.write().await = snapshot;
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

fn finish_rule(mut result: OrchestratorResult, layer: ClassifierLayer, started: Instant) -> OrchestratorResult {
    result.classification = Some(ClassificationResult::new(IntentType::Rule, 1.0, layer));
    result.metrics.classifier_layer = Some(layer);
    result.metrics.total_ms = elapsed_ms(started);
    result
}

fn finish(
    mut result: OrchestratorResult,
    classification: ClassificationResult,
    fallbacks: Vec<FallbackRecord>,
    llm_calls: u32,
    classification_ms: f64,
    handler_ms: f64,
    started: Instant,
) -> OrchestratorResult {
    for record in &fallbacks {
        tracing::info!(
            field = %record.config_field,
            value = %record.config_value,
            from = %record.from_intent,
            to = ?record.to_intent,
            "Fallback: {}",
            record
        );
    }

    // Records without a target only explain the outcome; nothing was re-routed.
    let fallback_used = fallbacks.iter().any(|record| record.to_intent.is_some());
    result.metrics.classifier_layer = Some(classification.layer);
    result.metrics.classification_ms = classification_ms;
    result.metrics.handler_ms = handler_ms;
    result.metrics.total_ms = elapsed_ms(started);
    result.metrics.llm_calls_count = llm_calls;
    result.metrics.fallback_used = fallback_used;
    result.classification = Some(classification);
    result.fallback_used = fallback_used;
    result.fallbacks = fallbacks;
    result
}
