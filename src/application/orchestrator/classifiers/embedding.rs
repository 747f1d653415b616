//! Embedding classifier: nearest intent prototype by cosine similarity.

use std::sync::Arc;

use futures::future::try_join_all;

use crate::domain::orchestrator::{ClassificationResult, ClassifierLayer, IntentType};
use crate::ports::{EmbeddingError, EmbeddingProvider};

/// Example utterances per intent, embedded once when the layer is built.
pub fn default_examples() -> Vec<(IntentType, Vec<String>)> {
    let examples: [(IntentType, &[&str]); 4] = [
        (
            IntentType::Rag,
            &[
                "Dokümanlarda bu konu hakkında ne yazıyor?",
                "Bilgi tabanında bu konuyla ilgili bilgi var mı?",
                "Yüklenen dosyalara göre cevap ver.",
                "What does the documentation say about this?",
                "Search the knowledge base for this topic.",
            ],
        ),
        (
            IntentType::Direct,
            &[
                "Python'da list comprehension nasıl yazılır?",
                "Merhaba, nasılsın?",
                "Bu cümleyi İngilizce'ye çevir.",
                "Özet çıkar.",
                "What is the capital of France?",
                "Explain quantum computing simply.",
            ],
        ),
        (
            IntentType::Rule,
            &[
                "Randevu almak istiyorum.",
                "Çalışma saatleriniz nedir?",
                "Fiyat listesi nedir?",
                "İletişim bilgileriniz nelerdir?",
                "What are your business hours?",
            ],
        ),
        (
            IntentType::Tool,
            &[
                "Bu veriyi analiz et.",
                "Grafik oluştur.",
                "Veritabanını sorgula.",
                "Run this query.",
                "Execute the report.",
            ],
        ),
    ];
    examples
        .into_iter()
        .map(|(intent, texts)| (intent, texts.iter().map(|t| t.to_string()).collect()))
        .collect()
}

/// Cosine similarity; 0 when either vector has (near) zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let (norm_a, norm_b) = (norm_a.sqrt(), norm_b.sqrt());
    if norm_a < 1e-12 || norm_b < 1e-12 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Prototype-based classifier. Build with [`EmbeddingClassifier::build`].
pub struct EmbeddingClassifier {
    embedder: Arc<dyn EmbeddingProvider>,
    prototypes: Vec<(IntentType, Vec<f32>)>,
}

impl std::fmt::Debug for EmbeddingClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClassifier")
            .field("prototypes", &self.prototypes.len())
            .finish()
    }
}

impl EmbeddingClassifier {
    /// Embeds every example. Any failure fails the whole build.
    pub async fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        examples: Vec<(IntentType, Vec<String>)>,
    ) -> Result<Self, EmbeddingError> {
        let batches = try_join_all(examples.iter().map(|(intent, texts)| {
            let embedder = embedder.clone();
            async move {
                let vectors = embedder.embed_batch(texts).await?;
                Ok::<_, EmbeddingError>(vectors.into_iter().map(|v| (*intent, v)).collect::<Vec<_>>())
            }
        }))
        .await?;
        let prototypes: Vec<_> = batches.into_iter().flatten().collect();
        tracing::info!(prototypes = prototypes.len(), "Embedding classifier prototypes built");
        Ok(Self {
            embedder,
            prototypes,
        })
    }

    pub fn prototype_count(&self) -> usize {
        self.prototypes.len()
    }

    /// Best-scoring intent. Ties keep the earlier prototype; with no
    /// prototypes the verdict is `direct` at 0.
    pub async fn classify(&self, query: &str) -> Result<ClassificationResult, EmbeddingError> {
        let query_vector = self.embedder.embed(query).await?;

        let mut best = (IntentType::Direct, f64::NEG_INFINITY);
        for (intent, prototype) in &self.prototypes {
            let score = cosine_similarity(&query_vector, prototype);
            if score > best.1 {
                best = (*intent, score);
            }
        }
        let (intent, score) = if best.1.is_finite() {
            best
        } else {
            (IntentType::Direct, 0.0)
        };

        tracing::debug!(intent = %intent, score, "Embedding classifier verdict");
        Ok(
            ClassificationResult::new(intent, score, ClassifierLayer::Embedding)
                .with_reasoning(format!("best cosine similarity: {:.4}", score)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockEmbeddingProvider;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let score = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn picks_nearest_prototype() {
        let embedder = MockEmbeddingProvider::new()
            .with_vector("fiyat nedir", vec![1.0, 0.0])
            .with_vector("selam", vec![0.0, 1.0])
            .with_vector("ücret ne kadar", vec![0.9, 0.1]);
        let classifier = EmbeddingClassifier::build(
            Arc::new(embedder),
            vec![
                (IntentType::Rule, vec!["fiyat nedir".to_string()]),
                (IntentType::Direct, vec!["selam".to_string()]),
            ],
        )
        .await
        .unwrap();

        let result = classifier.classify("ücret ne kadar").await.unwrap();
        assert_eq!(result.intent, IntentType::Rule);
        assert!(result.confidence > 0.9);
        assert_eq!(result.layer, ClassifierLayer::Embedding);
    }

    #[tokio::test]
    async fn negative_similarity_is_clipped() {
        let embedder = MockEmbeddingProvider::new()
            .with_vector("a", vec![1.0, 0.0])
            .with_vector("b", vec![-1.0, 0.0]);
        let classifier =
            EmbeddingClassifier::build(Arc::new(embedder), vec![(IntentType::Rag, vec!["a".to_string()])])
                .await
                .unwrap();

        let result = classifier.classify("b").await.unwrap();
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn build_fails_when_embedder_fails() {
        let embedder = MockEmbeddingProvider::new().failing();
        let result = EmbeddingClassifier::build(Arc::new(embedder), default_examples()).await;
        assert!(result.is_err());
    }
}
