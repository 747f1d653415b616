//! Intent classification layers.
//!
//! | Layer | Cost | Accepts at |
//! |-------|------|------------|
//! | [`PreClassifier`] | keyword scan | confidence ≥ 0.9 |
//! | [`EmbeddingClassifier`] | one embedding call | `embedding_confidence_threshold` |
//! | [`LlmClassifier`] | one model call | always |

mod cache;
mod cascade;
mod embedding;
mod llm;
mod pre;

pub use cache::{ClassificationCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use cascade::{rule_descriptions, ClassifierCascade};
pub use embedding::{cosine_similarity, default_examples, EmbeddingClassifier};
pub use llm::{
    parse_verdict, strip_code_fence, truncate, ClassificationPrompt, LlmClassifier,
    DEFAULT_CLASSIFICATION_PROMPT, HISTORY_TURN_CHARS,
};
pub use pre::{PreClassifier, DEFAULT_RAG_SIGNALS, PRE_ACCEPT_CONFIDENCE};
