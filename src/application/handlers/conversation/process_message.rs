//! ProcessMessage command handler.
//!
//! Runs the decision engine for one message of a tracked conversation:
//!
//! 1. load history, the last assistant intent and the flow state
//! 2. record the user message (committed before deciding)
//! 3. decide
//! 4. record the assistant message, its events and the flow-state update
//!    together
//!
//! Messages of one conversation must be processed one at a time: the flow
//! state is read before and written after the decision without a lock.

use std::sync::Arc;
use thiserror::Error;

use crate::application::orchestrator::{Orchestrator, OrchestratorError, ProcessRequest};
use crate::domain::conversation::{Message, MessageEvent};
use crate::domain::foundation::{ConversationId, MessageId};
use crate::domain::orchestrator::{ConversationTurn, IntentType, OrchestratorResult};
use crate::domain::rules::FlowContext;
use crate::ports::{
    ConversationRepository, FlowStateUpdate, MessageRepository, RepositoryError, TurnRecorder,
};

/// Messages scanned backwards for the last assistant intent.
pub const LAST_INTENT_SCAN: usize = 50;

/// Command to process a user message.
#[derive(Debug, Clone)]
pub struct ProcessMessageCommand {
    pub conversation_id: ConversationId,
    pub content: String,
}

impl ProcessMessageCommand {
    pub fn new(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            content: content.into(),
        }
    }
}

/// Errors that can occur when processing a message.
#[derive(Debug, Clone, Error)]
pub enum ProcessMessageError {
    #[error("Validation error: message content cannot be empty")]
    EmptyContent,

    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("Conversation is closed: {0}")]
    Closed(ConversationId),

    /// The decision failed after the user message was recorded.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ProcessMessageError {
    /// Text safe to show to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProcessMessageError::Orchestrator(e) => e.user_message(),
            ProcessMessageError::Closed(_) => "This conversation has ended.",
            _ => "Sorry, something went wrong while answering. Please try again later.",
        }
    }
}

/// Result of processing a message.
#[derive(Debug, Clone)]
pub struct ProcessMessageResult {
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
    pub result: OrchestratorResult,
}

/// Handler for processing messages of tracked conversations.
pub struct ProcessMessageHandler {
    orchestrator: Arc<Orchestrator>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    recorder: Arc<dyn TurnRecorder>,
}

impl ProcessMessageHandler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        recorder: Arc<dyn TurnRecorder>,
    ) -> Self {
        Self {
            orchestrator,
            conversations,
            messages,
            recorder,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessMessageCommand,
    ) -> Result<ProcessMessageResult, ProcessMessageError> {
        let query = cmd.content.trim();
        if query.is_empty() {
            return Err(ProcessMessageError::EmptyContent);
        }

        let conversation = self
            .conversations
            .find_by_id(cmd.conversation_id)
            .await?
            .ok_or(ProcessMessageError::NotFound(cmd.conversation_id))?;
        if !conversation.is_active() {
            return Err(ProcessMessageError::Closed(cmd.conversation_id));
        }

        // 1. Context
        let history_limit = self.orchestrator.snapshot().await.config().history_limit();
        let recent = self
            .messages
            .get_recent(cmd.conversation_id, history_limit.max(LAST_INTENT_SCAN))
            .await?;
        let history = history_turns(&recent, history_limit);
        let last_intent = last_assistant_intent(&recent);
        let flow_state = self.conversations.get_flow_state(cmd.conversation_id).await?;
        let flow = FlowContext::from_optional(flow_state.as_ref());

        // 2. User turn
        let user_message = Message::user(cmd.conversation_id, query);
        self.recorder.record_user_turn(&user_message).await?;

        // 3. Decide
        let request = ProcessRequest::new(query)
            .with_history(&history)
            .with_last_intent(last_intent)
            .with_flow(flow)
            .with_platform(Some(conversation.platform()));
        let result = match self.orchestrator.process(request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(conversation_id = %cmd.conversation_id, "Message processing failed: {}", e);
                return Err(e.into());
            }
        };

        // 4. Assistant turn
        let assistant_message = Message::assistant(cmd.conversation_id, &result);
        let events = MessageEvent::from_result(assistant_message.id(), &result);
        let flow_update = match result.next_flow_context() {
            Some(next) => FlowStateUpdate::Set(Some(next.to_value()).filter(|v| !v.is_null())),
            None => FlowStateUpdate::Keep,
        };
        self.recorder
            .record_assistant_turn(&assistant_message, &events, flow_update)
            .await?;

        tracing::info!(
            conversation_id = %cmd.conversation_id,
            intent = %result.intent,
            layer = ?result.classifier_layer(),
            events = events.len(),
            "Message processed"
        );

        Ok(ProcessMessageResult {
            user_message_id: user_message.id(),
            assistant_message_id: assistant_message.id(),
            result,
        })
    }
}

/// The last `limit` messages as prompt turns. Empty assistant turns are
/// dropped.
fn history_turns(recent: &[Message], limit: usize) -> Vec<ConversationTurn> {
    if limit == 0 {
        return Vec::new();
    }
    recent[recent.len().saturating_sub(limit)..]
        .iter()
        .filter(|m| !m.content().trim().is_empty())
        .map(|m| ConversationTurn {
            role: m.role(),
            content: m.content().to_string(),
        })
        .collect()
}

fn last_assistant_intent(recent: &[Message]) -> Option<IntentType> {
    recent.iter().rev().find_map(Message::intent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryConversationStore, MockLlmProvider};
    use crate::domain::conversation::{ContactInfo, Conversation, MessageEventType};
    use crate::domain::rules::Rule;
    use crate::ports::LlmError;

    async fn setup(orchestrator: Orchestrator) -> (ProcessMessageHandler, Arc<InMemoryConversationStore>, ConversationId) {
        let store = Arc::new(InMemoryConversationStore::new());
        let conversation = Conversation::start("cli", None, ContactInfo::default()).unwrap();
        store.create(&conversation).await.unwrap();
        let handler = ProcessMessageHandler::new(
            Arc::new(orchestrator),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        (handler, store, conversation.id())
    }

    #[tokio::test]
    async fn test_process_records_both_turns_and_events() {
        let orchestrator = Orchestrator::builder()
            .with_llm(Arc::new(MockLlmProvider::new()))
            .with_rules(vec![Rule::new("saatler", "09:00-18:00").with_triggers(["saat"])])
            .build()
            .await
            .unwrap();
        let (handler, store, id) = setup(orchestrator).await;

        let outcome = handler
            .handle(ProcessMessageCommand::new(id, "çalışma saatleri?"))
            .await
            .unwrap();

        assert_eq!(outcome.result.answer.as_deref(), Some("09:00-18:00"));
        let messages = store.get_recent(id, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].intent(), Some(IntentType::Rule));
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap().message_count(), 2);

        let events = store.events_for(outcome.assistant_message_id).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == MessageEventType::RuleMatched));
        assert!(store.get_flow_state(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_and_last_intent_reach_the_classifier() {
        let llm = Arc::new(
            MockLlmProvider::new()
                .with_response(r#"{"intent":"direct","confidence":0.9}"#)
                .with_response("Merhaba!")
                .with_response(r#"{"intent":"direct","confidence":0.9}"#)
                .with_response("İyiyim."),
        );
        let orchestrator = Orchestrator::builder().with_llm(llm.clone()).build().await.unwrap();
        let (handler, _, id) = setup(orchestrator).await;

        handler.handle(ProcessMessageCommand::new(id, "selam")).await.unwrap();
        handler.handle(ProcessMessageCommand::new(id, "nasılsın")).await.unwrap();

        let prompt = llm.get_calls()[2].last_user_content().unwrap();
        assert!(prompt.contains("selam"));
        assert!(prompt.contains("Merhaba!"));
        assert!(prompt.contains("direct"));
    }

    #[tokio::test]
    async fn test_closed_conversation_is_rejected() {
        let orchestrator = Orchestrator::builder()
            .with_llm(Arc::new(MockLlmProvider::new()))
            .build()
            .await
            .unwrap();
        let (handler, store, id) = setup(orchestrator).await;
        store.close(id).await.unwrap();

        let result = handler.handle(ProcessMessageCommand::new(id, "selam")).await;

        assert!(matches!(result, Err(ProcessMessageError::Closed(_))));
        assert!(store.get_recent(id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_rejected() {
        let orchestrator = Orchestrator::builder()
            .with_llm(Arc::new(MockLlmProvider::new()))
            .build()
            .await
            .unwrap();
        let (handler, _, _) = setup(orchestrator).await;

        let result = handler
            .handle(ProcessMessageCommand::new(ConversationId::new(), "selam"))
            .await;

        assert!(matches!(result, Err(ProcessMessageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_classification_failure_keeps_user_message() {
        let llm = Arc::new(MockLlmProvider::new().with_error(LlmError::unavailable("down")));
        let orchestrator = Orchestrator::builder().with_llm(llm).build().await.unwrap();
        let (handler, store, id) = setup(orchestrator).await;

        let err = handler
            .handle(ProcessMessageCommand::new(id, "selam"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessMessageError::Orchestrator(_)));
        assert!(!err.user_message().contains("down"));
        let messages = store.get_recent(id, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content(), "selam");
    }

    #[test]
    fn test_history_limit_zero_disables_history() {
        let id = ConversationId::new();
        let recent = vec![Message::user(id, "bir"), Message::user(id, "iki")];
        assert!(history_turns(&recent, 0).is_empty());
        assert_eq!(history_turns(&recent, 1)[0].content, "iki");
    }
}
