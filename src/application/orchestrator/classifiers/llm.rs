//! LLM classifier: the last, always-answering layer.

use serde_json::Value;
use std::sync::Arc;

use crate::application::orchestrator::deadline::complete_within;
use crate::domain::orchestrator::{ClassificationResult, ClassifierLayer, ConversationTurn, IntentType};
use crate::ports::{CompletionRequest, LlmError, LlmProvider};

/// Characters of each history turn shown to the classifier.
pub const HISTORY_TURN_CHARS: usize = 200;

pub const DEFAULT_CLASSIFICATION_PROMPT: &str = r#"You are an intent classifier. Analyse the user message and choose EXACTLY ONE category:

1. "rag"    — The user needs information from uploaded documents / knowledge base.
2. "direct" — General knowledge, conversation, translation, summarisation (no knowledge base needed).
3. "rule"   — The message matches one of the fixed rules listed below.
4. "tool"   — An external tool or function should be invoked.

{rules_section}
{tools_section}
{context_section}

Current user message: "{query}"

Respond with ONLY valid JSON (no markdown, no explanation):
{"intent": "<rag|direct|rule|tool>", "confidence": <0.0-1.0>, "reasoning": "<one sentence>"}
"#;

/// Everything the prompt is built from.
#[derive(Debug, Clone, Default)]
pub struct ClassificationPrompt<'a> {
    pub query: &'a str,
    pub rule_descriptions: &'a [String],
    pub tool_descriptions: &'a [String],
    /// Already limited to the turns the classifier may see.
    pub history: &'a [ConversationTurn],
    pub last_intent: Option<IntentType>,
    /// Replaces [`DEFAULT_CLASSIFICATION_PROMPT`].
    pub template: Option<&'a str>,
}

impl ClassificationPrompt<'_> {
    pub fn render(&self) -> String {
        let rules_section = listing("Active rules", self.rule_descriptions);
        let tools_section = listing("Available tools", self.tool_descriptions);

        let lines: Vec<String> = self
            .history
            .iter()
            .filter_map(|turn| {
                let content = turn.content.trim();
                (!content.is_empty())
                    .then(|| format!("{}: {}", turn.role, truncate(content, HISTORY_TURN_CHARS)))
            })
            .collect();
        let mut context_section = String::new();
        if !lines.is_empty() {
            context_section = format!("Recent conversation:\n{}\n\n", lines.join("\n"));
            if let Some(intent) = self.last_intent {
                context_section.push_str(&format!(
                    "(Previous reply was from intent: {}. If this is a follow-up, prefer the same intent.)\n\n",
                    intent
                ));
            }
        }

        self.template
            .unwrap_or(DEFAULT_CLASSIFICATION_PROMPT)
            .replace("{{", "\u{0}")
            .replace("}}", "\u{1}")
            .replace("{rules_section}", &rules_section)
            .replace("{tools_section}", &tools_section)
            .replace("{context_section}", &context_section)
            .replace("{query}", self.query)
            .replace('\u{0}', "{")
            .replace('\u{1}', "}")
    }
}

fn listing(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        format!("{}: (none)", title)
    } else {
        let body: Vec<String> = items.iter().map(|d| format!("- {}", d)).collect();
        format!("{}:\n{}", title, body.join("\n"))
    }
}

/// First `max` characters of `text`.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Removes a surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parses the model's verdict. Never fails: unparseable output becomes
/// `direct` at 0 and an unknown intent becomes `direct`.
pub fn parse_verdict(raw: &str) -> ClassificationResult {
    let cleaned = strip_code_fence(raw);
    let data: Value = match serde_json::from_str(&cleaned) {
        Ok(data) => data,
        Err(_) => {
            tracing::warn!("LLM classifier returned unparseable JSON: {}", truncate(&cleaned, 200));
            return ClassificationResult::new(IntentType::Direct, 0.0, ClassifierLayer::Llm)
                .with_reasoning("JSON parse error");
        }
    };

    let intent = match data.get("intent") {
        Some(Value::String(s)) => s.parse().unwrap_or(IntentType::Direct),
        Some(other) => other.to_string().parse().unwrap_or(IntentType::Direct),
        None => IntentType::Direct,
    };
    let confidence = match data.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.5),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.5),
        _ => 0.5,
    };
    let reasoning = match data.get("reasoning") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    ClassificationResult::new(intent, confidence, ClassifierLayer::Llm).with_reasoning(reasoning)
}

pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// One model call. Provider errors and timeouts are returned as-is.
    pub async fn classify(
        &self,
        prompt: &ClassificationPrompt<'_>,
        timeout_secs: Option<f64>,
    ) -> Result<ClassificationResult, LlmError> {
        let request = CompletionRequest::prompt(prompt.render()).with_temperature(0.0);
        let response = complete_within(self.llm.as_ref(), request, timeout_secs).await?;
        Ok(parse_verdict(&response.content))
    }
}
