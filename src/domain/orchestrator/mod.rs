//! Decision engine vocabulary: intents, classifications, fallbacks and results.

mod intent;
mod result;

pub use intent::{ClassifierLayer, IntentType, LowConfidenceStrategy, RagUnavailablePolicy, UnknownIntent};
pub use result::{
    clip_confidence, ClassificationResult, ConversationTurn, FallbackRecord, FallbackStage,
    OrchestratorMetrics, OrchestratorResult, Source, NEXT_FLOW_CONTEXT,
};
