//! Qdrant retrieval backend over the REST API.
//!
//! Points are expected to carry `content`, `title`, `document_id` and
//! `chunk_index` in their payload.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::RetrievalConfig;
use crate::ports::{Passage, RetrievalBackend, RetrievalError};

pub struct QdrantRetrievalBackend {
    client: Client,
    base_url: String,
    collection: String,
    api_key: Option<SecretString>,
    score_threshold: Option<f64>,
    timeout_secs: f64,
}

impl QdrantRetrievalBackend {
    /// `None` when no Qdrant URL is configured.
    pub fn from_config(config: &RetrievalConfig) -> Result<Option<Self>, RetrievalError> {
        let Some(url) = config.qdrant_url.as_deref().filter(|_| config.is_configured()) else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RetrievalError::unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Some(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
            score_threshold: None,
            timeout_secs: config.timeout().as_secs_f64(),
        }))
    }

    /// Drop hits scoring below `threshold`.
    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    fn search_url(&self) -> String {
        format!("{}/collections/{}/points/search", self.base_url, self.collection)
    }
}

#[async_trait]
impl RetrievalBackend for QdrantRetrievalBackend {
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Passage>, RetrievalError> {
        let body = SearchRequest {
            vector,
            limit: top_k,
            with_payload: true,
            score_threshold: self.score_threshold,
        };

        let mut request = self.client.post(self.search_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                RetrievalError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::unavailable(format!(
                "Qdrant returned {}: {}",
                status, error_body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        let passages: Vec<Passage> = parsed.result.into_iter().map(ScoredPoint::into_passage).collect();
        tracing::debug!(collection = %self.collection, hits = passages.len(), "Qdrant search completed");
        Ok(passages)
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f64,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl ScoredPoint {
    fn into_passage(self) -> Passage {
        let payload = self.payload.unwrap_or_default();
        let text = |key: &str| payload.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        let mut passage = Passage::new(text("title"), text("content"), self.score);
        passage.document_id = payload.get("document_id").and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        passage.chunk_index = payload
            .get("chunk_index")
            .and_then(Value::as_u64)
            .and_then(|i| u32::try_from(i).ok());
        passage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unconfigured_backend_is_none() {
        let config = RetrievalConfig::default();
        assert!(QdrantRetrievalBackend::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn search_url_uses_collection() {
        let config = RetrievalConfig {
            qdrant_url: Some("http://localhost:6333/".to_string()),
            collection: "kb".to_string(),
            ..Default::default()
        };
        let backend = QdrantRetrievalBackend::from_config(&config).unwrap().unwrap();
        assert_eq!(backend.search_url(), "http://localhost:6333/collections/kb/points/search");
    }

    #[test]
    fn payload_maps_to_passage() {
        let raw = json!({
            "result": [
                {"id": 1, "score": 0.83, "payload": {
                    "content": "Kargo ücretsizdir.", "title": "Kargo",
                    "document_id": "d-9", "chunk_index": 4}},
                {"id": 2, "score": 0.5}
            ]
        });
        let response: SearchResponse = serde_json::from_value(raw).unwrap();
        let passages: Vec<_> = response.result.into_iter().map(ScoredPoint::into_passage).collect();

        assert_eq!(passages[0].text, "Kargo ücretsizdir.");
        assert_eq!(passages[0].document_id.as_deref(), Some("d-9"));
        assert_eq!(passages[0].chunk_index, Some(4));
        assert_eq!(passages[1].text, "");
        assert!(passages[1].document_id.is_none());
    }
}
