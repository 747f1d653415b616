//! RAG handler: retrieve passages, then answer from them.

use async_trait::async_trait;
use std::sync::Arc;

use super::{failed, system_prompt, HandlerRequest, IntentHandler};
use crate::application::orchestrator::classifiers::truncate;
use crate::application::orchestrator::deadline::{complete_within, within};
use crate::config::BotConfig;
use crate::domain::orchestrator::{ConversationTurn, IntentType, OrchestratorResult};
use crate::ports::{
    CompletionRequest, EmbeddingError, EmbeddingProvider, LlmProvider, Passage, PromptRole,
    RetrievalBackend, RetrievalError,
};

/// Turns of history folded into the retrieval query.
pub const RAG_HISTORY_TURNS: usize = 4;

const RAG_TURN_CHARS: usize = 200;

/// Prefixes the query with recent turns so follow-ups ("what about its
/// price?") retrieve the right passages.
pub fn enrich_query(query: &str, history: &[ConversationTurn]) -> String {
    let start = history.len().saturating_sub(RAG_HISTORY_TURNS);
    let lines: Vec<String> = history[start..]
        .iter()
        .filter_map(|turn| {
            let content = turn.content.trim();
            (!content.is_empty()).then(|| format!("{}: {}", turn.role, truncate(content, RAG_TURN_CHARS)))
        })
        .collect();
    if lines.is_empty() {
        return query.to_string();
    }
    format!(
        "Previous conversation:\n{}\n\nCurrent question: {}",
        lines.join("\n"),
        query
    )
}

fn context_block(passages: &[Passage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}\n{}", i + 1, p.title, p.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct RagHandler {
    embedder: Arc<dyn EmbeddingProvider>,
    retrieval: Arc<dyn RetrievalBackend>,
    llm: Arc<dyn LlmProvider>,
    config: Arc<BotConfig>,
    top_k: usize,
}

impl RagHandler {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: Arc<dyn RetrievalBackend>,
        llm: Arc<dyn LlmProvider>,
        config: Arc<BotConfig>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            retrieval,
            llm,
            config,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl IntentHandler for RagHandler {
    fn intent(&self) -> IntentType {
        IntentType::Rag
    }

    async fn handle(&self, request: &HandlerRequest<'_>) -> OrchestratorResult {
        let timeout = self.config.llm_timeout_seconds;
        let enriched = enrich_query(request.query, request.history);

        let vector = match within(timeout, self.embedder.embed(&enriched), |secs| {
            EmbeddingError::Timeout { timeout_secs: secs }
        })
        .await
        {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!("RAG query embedding failed: {}", e);
                return failed(request.query, IntentType::Rag, e.to_string());
            }
        };

        let passages = match within(timeout, self.retrieval.search(&vector, self.top_k), |secs| {
            RetrievalError::Timeout { timeout_secs: secs }
        })
        .await
        {
            Ok(passages) => passages,
            Err(e) => {
                tracing::warn!("RAG search failed: {}", e);
                return failed(request.query, IntentType::Rag, e.to_string());
            }
        };

        if passages.is_empty() {
            tracing::debug!("RAG search returned no passages");
            return OrchestratorResult::new(request.query, IntentType::Rag);
        }

        let system = format!(
            "{}\n\nAnswer the question using only the context below. \
             If the context does not contain the answer, say that you do not know.\n\nContext:\n{}",
            system_prompt(&self.config),
            context_block(&passages)
        );
        let completion = CompletionRequest::new()
            .with_system_prompt(system)
            .with_message(PromptRole::User, enriched);

        let mut result = match complete_within(self.llm.as_ref(), completion, timeout).await {
            Ok(response) => {
                let mut result = OrchestratorResult::new(request.query, IntentType::Rag);
                result.answer = Some(response.content);
                result.sources = passages.iter().map(Passage::to_source).collect();
                result
            }
            Err(e) => {
                tracing::warn!("RAG answer generation failed: {}", e);
                failed(request.query, IntentType::Rag, e.to_string())
            }
        };
        result.metrics.llm_calls_count = 1;
        result
    }
}
