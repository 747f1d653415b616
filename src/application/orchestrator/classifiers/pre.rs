//! Keyword classifier: no network calls.

use crate::domain::orchestrator::{ClassificationResult, ClassifierLayer, IntentType};

/// Confidence at which a keyword verdict is accepted without further layers.
pub const PRE_ACCEPT_CONFIDENCE: f64 = 0.9;

const RULE_CONFIDENCE: f64 = 0.95;
const TOOL_CONFIDENCE: f64 = 0.90;
const RAG_CONFIDENCE: f64 = 0.85;

/// Phrases that point at the knowledge base.
pub const DEFAULT_RAG_SIGNALS: [&str; 12] = [
    "dosyada",
    "belgede",
    "dokümanda",
    "dosyaya göre",
    "kaynağa göre",
    "ne yazıyor",
    "hangi dokümanda",
    "yüklenen",
    "bilgi tabanı",
    "in the document",
    "according to the file",
    "knowledge base",
];

/// Substring matcher over rule keywords, tool triggers and RAG signals,
/// checked in that order.
#[derive(Debug, Clone, Default)]
pub struct PreClassifier {
    rule_keywords: Vec<String>,
    tool_triggers: Vec<(String, Vec<String>)>,
    rag_signals: Vec<String>,
}

impl PreClassifier {
    pub fn new(rule_keywords: Vec<String>, tool_triggers: Vec<(String, Vec<String>)>) -> Self {
        Self {
            rule_keywords: lowered(rule_keywords),
            tool_triggers: tool_triggers
                .into_iter()
                .map(|(name, triggers)| (name, lowered(triggers)))
                .collect(),
            rag_signals: DEFAULT_RAG_SIGNALS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_rag_signals(mut self, signals: Vec<String>) -> Self {
        self.rag_signals = lowered(signals);
        self
    }

    /// Returns a verdict when any keyword set hits, `None` otherwise.
    pub fn classify(&self, query: &str) -> Option<ClassificationResult> {
        let lower = query.to_lowercase();

        if let Some(kw) = self.rule_keywords.iter().find(|kw| lower.contains(kw.as_str())) {
            tracing::debug!(keyword = %kw, "Pre-classifier matched rule keyword");
            return Some(verdict(IntentType::Rule, RULE_CONFIDENCE, format!("keyword match: {}", kw)));
        }

        for (tool, triggers) in &self.tool_triggers {
            if let Some(t) = triggers.iter().find(|t| lower.contains(t.as_str())) {
                tracing::debug!(trigger = %t, tool = %tool, "Pre-classifier matched tool trigger");
                return Some(verdict(
                    IntentType::Tool,
                    TOOL_CONFIDENCE,
                    format!("tool trigger: {} → {}", t, tool),
                ));
            }
        }

        if let Some(signal) = self.rag_signals.iter().find(|s| lower.contains(s.as_str())) {
            tracing::debug!(signal = %signal, "Pre-classifier matched RAG signal");
            return Some(verdict(IntentType::Rag, RAG_CONFIDENCE, format!("RAG signal: {}", signal)));
        }

        None
    }
}

fn verdict(intent: IntentType, confidence: f64, reasoning: String) -> ClassificationResult {
    ClassificationResult::new(intent, confidence, ClassifierLayer::Pre).with_reasoning(reasoning)
}

fn lowered(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.to_lowercase())
        .filter(|s| !s.trim().is_empty())
        .collect()
}
