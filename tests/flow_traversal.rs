//! Integration tests for multi-turn rule flows.
//!
//! Messages go through the full `ProcessMessageHandler` path with the
//! in-memory store, so the flow state written after one turn is exactly what
//! the next turn reads back.

use std::sync::Arc;

use serde_json::Value;

use queryon::adapters::{InMemoryConversationStore, MockLlmProvider};
use queryon::application::handlers::ProcessMessageResult;
use queryon::application::{
    Orchestrator, ProcessMessageCommand, ProcessMessageHandler, StartConversationCommand,
    StartConversationHandler,
};
use queryon::domain::conversation::MessageEventType;
use queryon::domain::foundation::ConversationId;
use queryon::domain::orchestrator::{ClassifierLayer, IntentType};
use queryon::domain::rules::Rule;
use queryon::ports::{ConversationRepository, MessageRepository};

// =============================================================================
// Test Infrastructure
// =============================================================================

/// A return flow: pick a reason, then either finish or give an order number.
fn return_flow() -> Vec<Rule> {
    vec![
        Rule::new("iade başlat", "İade nedeniniz nedir? 1) kargo hasarlı 2) ürün hatalı")
            .with_triggers(["iade"])
            .in_flow("iade", "start")
            .with_next_steps([("1", "kargo"), ("2", "urun")]),
        Rule::new("kargo hasarı", "Lütfen hasarlı paketin fotoğrafını gönderin.")
            .in_flow("iade", "kargo")
            .requires_step("start"),
        Rule::new("ürün hatası", "Sipariş numaranızı yazar mısınız?")
            .in_flow("iade", "urun")
            .requires_step("start")
            .with_next_steps([("*", "tamam")]),
        Rule::new("iade tamam", "Talebiniz alındı, 2 iş günü içinde dönüş yapacağız.")
            .in_flow("iade", "tamam")
            .requires_step("urun"),
        Rule::new("şikayet başlat", "Şikayetinizi kısaca yazar mısınız?")
            .with_triggers(["şikayet"])
            .in_flow("sikayet", "start")
            .with_next_steps([("*", "kayit")]),
        Rule::new("şikayet kaydı", "Şikayetiniz kaydedildi.")
            .in_flow("sikayet", "kayit")
            .requires_step("start"),
        Rule::new("çalışma saatleri", "Hafta içi 09:00-18:00 arası açığız.").with_triggers(["saat"]),
    ]
}

struct Harness {
    handler: ProcessMessageHandler,
    store: Arc<InMemoryConversationStore>,
    llm: Arc<MockLlmProvider>,
    conversation_id: ConversationId,
}

impl Harness {
    async fn new(llm: MockLlmProvider) -> Self {
        let llm = Arc::new(llm);
        let orchestrator = Orchestrator::builder()
            .with_llm(llm.clone())
            .with_rules(return_flow())
            .build()
            .await
            .unwrap();
        let store = Arc::new(InMemoryConversationStore::new());
        let conversation_id = StartConversationHandler::new(store.clone())
            .handle(StartConversationCommand::new("whatsapp"))
            .await
            .unwrap()
            .conversation_id;
        let handler =
            ProcessMessageHandler::new(Arc::new(orchestrator), store.clone(), store.clone(), store.clone());
        Self {
            handler,
            store,
            llm,
            conversation_id,
        }
    }

    async fn send(&self, text: &str) -> ProcessMessageResult {
        self.handler
            .handle(ProcessMessageCommand::new(self.conversation_id, text))
            .await
            .unwrap()
    }

    async fn flow_state(&self) -> Option<Value> {
        self.store.get_flow_state(self.conversation_id).await.unwrap()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_flow_runs_from_entry_to_final_step() {
    let harness = Harness::new(MockLlmProvider::new()).await;

    // Entry
    let first = harness.send("ürünü iade etmek istiyorum").await;
    assert_eq!(first.result.intent, IntentType::Rule);
    assert_eq!(first.result.rule_matched.as_deref(), Some("iade başlat"));
    assert_eq!(first.result.classifier_layer(), Some(ClassifierLayer::RulesFirst));
    let state = harness.flow_state().await.unwrap();
    assert_eq!(state["flow_id"], "iade");
    assert_eq!(state["current_step"], "start");

    // Choice "2" moves to the product step and remembers the answer
    let second = harness.send("2").await;
    assert_eq!(second.result.rule_matched.as_deref(), Some("ürün hatası"));
    assert_eq!(second.result.classifier_layer(), Some(ClassifierLayer::FlowRule));
    let state = harness.flow_state().await.unwrap();
    assert_eq!(state["current_step"], "urun");
    assert_eq!(state["selections"]["start"], "2");

    // Any reply is accepted by the wildcard; the last step ends the flow
    let third = harness.send("SP-20931").await;
    assert_eq!(third.result.rule_matched.as_deref(), Some("iade tamam"));
    assert!(harness.flow_state().await.is_none());

    assert_eq!(harness.llm.call_count(), 0);
    let conversation = harness
        .store
        .find_by_id(harness.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.message_count(), 6);
}

#[tokio::test]
async fn test_terminal_choice_clears_flow_state() {
    let harness = Harness::new(MockLlmProvider::new()).await;

    harness.send("iade").await;
    let reply = harness.send("1").await;

    assert_eq!(reply.result.rule_matched.as_deref(), Some("kargo hasarı"));
    assert_eq!(
        reply.result.answer_text(),
        Some("Lütfen hasarlı paketin fotoğrafını gönderin.")
    );
    assert!(harness.flow_state().await.is_none());
}

#[tokio::test]
async fn test_off_script_message_keeps_flow_state() {
    let harness = Harness::new(
        MockLlmProvider::new()
            .with_response(r#"{"intent": "direct", "confidence": 0.92}"#)
            .with_response("Merhaba! Size nasıl yardımcı olabilirim?"),
    )
    .await;

    harness.send("iade").await;
    let off_script = harness.send("merhaba nasılsınız").await;

    assert_eq!(off_script.result.intent, IntentType::Direct);
    assert_eq!(
        off_script.result.answer_text(),
        Some("Merhaba! Size nasıl yardımcı olabilirim?")
    );
    let state = harness.flow_state().await.unwrap();
    assert_eq!(state["current_step"], "start");

    // The flow picks up where it was left
    let resumed = harness.send("1").await;
    assert_eq!(resumed.result.rule_matched.as_deref(), Some("kargo hasarı"));
    assert!(harness.flow_state().await.is_none());
}

#[tokio::test]
async fn test_standalone_rule_does_not_touch_flow_state() {
    let harness = Harness::new(MockLlmProvider::new()).await;

    let result = harness.send("çalışma saatleriniz nedir").await;

    assert_eq!(result.result.rule_matched.as_deref(), Some("çalışma saatleri"));
    assert!(result.result.next_flow_context().is_none());
    assert!(harness.flow_state().await.is_none());
}

#[tokio::test]
async fn test_flow_turns_are_recorded_with_events() {
    let harness = Harness::new(MockLlmProvider::new()).await;

    let entry = harness.send("iade").await;
    let events = harness
        .store
        .events_for(entry.assistant_message_id)
        .await
        .unwrap();
    let types: Vec<MessageEventType> = events.iter().map(|e| e.event_type).collect();
    assert!(types.contains(&MessageEventType::ClassificationResult));
    assert!(types.contains(&MessageEventType::RuleMatched));
    assert!(!types.contains(&MessageEventType::FallbackTriggered));

    let history = harness
        .store
        .get_recent(harness.conversation_id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content(), "iade");
    assert_eq!(history[1].intent(), Some(IntentType::Rule));
}

#[tokio::test]
async fn test_other_flow_entry_does_not_hijack_active_flow() {
    let harness = Harness::new(
        MockLlmProvider::new()
            .with_response(r#"{"intent": "direct", "confidence": 0.9}"#)
            .with_response("Şikayetinizi iade sonrası da iletebilirsiniz."),
    )
    .await;

    harness.send("iade").await;
    let reply = harness.send("şikayet de etmek istiyorum").await;

    assert_eq!(reply.result.intent, IntentType::Direct);
    assert!(reply.result.rule_matched.is_none());
    let state = harness.flow_state().await.unwrap();
    assert_eq!(state["flow_id"], "iade");
    assert_eq!(state["current_step"], "start");
}

#[tokio::test]
async fn test_standalone_rule_answers_inside_active_flow() {
    let harness = Harness::new(MockLlmProvider::new()).await;

    harness.send("iade").await;
    let reply = harness.send("saat kaça kadar açıksınız").await;

    assert_eq!(reply.result.rule_matched.as_deref(), Some("çalışma saatleri"));
    assert_eq!(reply.result.classifier_layer(), Some(ClassifierLayer::RulesFirst));
    let state = harness.flow_state().await.unwrap();
    assert_eq!(state["flow_id"], "iade");
    assert_eq!(state["current_step"], "start");
    assert_eq!(harness.llm.call_count(), 0);
}
