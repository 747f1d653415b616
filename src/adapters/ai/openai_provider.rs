//! OpenAI Provider - chat completions, function calling and embeddings over
//! any OpenAI-compatible API.
//!
//! # Configuration
//!
//! ```ignore
//! let config = OpenAiConfig::new(api_key)
//!     .with_chat_model("gpt-4o-mini")
//!     .with_base_url("https://api.openai.com/v1");
//!
//! let provider = OpenAiProvider::new(config)?;
//! ```
//!
//! Retryable failures (rate limits, 5xx, network, timeouts) are retried with
//! exponential backoff up to `max_retries` times.

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AiConfig;
use crate::ports::{
    CompletionRequest, CompletionResponse, EmbeddingError, EmbeddingProvider, FunctionCall,
    FunctionCallRequest, LlmError, LlmProvider, PromptMessage, PromptRole, ProviderInfo,
    TokenUsage,
};

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    api_key: Secret<String>,
    pub chat_model: String,
    pub embedding_model: String,
    /// Base URL for the API (default: https://api.openai.com/v1).
    pub base_url: String,
    pub timeout: Duration,
    /// Maximum retries on transient failures.
    pub max_retries: u32,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
        }
    }

    /// Builds the provider config from application settings.
    /// `None` when no API key is configured.
    pub fn from_settings(settings: &AiConfig) -> Option<Self> {
        if !settings.has_api_key() {
            return None;
        }
        let key = settings.api_key.as_ref()?.expose_secret().clone();
        Some(
            Self::new(key)
                .with_chat_model(settings.chat_model.clone())
                .with_embedding_model(settings.embedding_model.clone())
                .with_base_url(settings.base_url.clone())
                .with_timeout(settings.timeout())
                .with_max_retries(settings.max_retries),
        )
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// OpenAI-compatible API provider.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    fn messages(system_prompt: Option<&str>, messages: &[PromptMessage]) -> Vec<OpenAiMessage> {
        system_prompt
            .map(|prompt| OpenAiMessage {
                role: "system".to_string(),
                content: Some(prompt.to_string()),
                tool_calls: None,
            })
            .into_iter()
            .chain(messages.iter().map(|msg| OpenAiMessage {
                role: match msg.role {
                    PromptRole::System => "system",
                    PromptRole::User => "user",
                    PromptRole::Assistant => "assistant",
                }
                .to_string(),
                content: Some(msg.content.clone()),
                tool_calls: None,
            }))
            .collect()
    }

    /// POSTs `body` to `path`, retrying transient failures.
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut retry_count = 0;
        loop {
            let attempt = match self.send(path, body).await {
                Ok(response) => Self::parse(response).await,
                Err(err) => Err(err),
            };
            match attempt {
                Ok(parsed) => return Ok(parsed),
                Err(err) if !err.is_retryable() || retry_count >= self.config.max_retries => {
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(retry = retry_count + 1, "OpenAI request failed, retrying: {}", err);
                }
            }

            // Exponential backoff: 1s, 2s, 4s, ...
            sleep(Duration::from_secs(1 << retry_count.min(5))).await;
            retry_count += 1;
        }
    }

    async fn send<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Response, LlmError> {
        self.client
            .post(self.url(path))
            .bearer_auth(self.config.api_key())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(self.config.timeout.as_secs_f64())
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {}", e))
                } else {
                    LlmError::network(e.to_string())
                }
            })
    }

    async fn parse<R: DeserializeOwned>(response: Response) -> Result<R, LlmError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| LlmError::parse(format!("Failed to parse response: {}", e)));
        }

        let error_body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(LlmError::AuthenticationFailed),
            429 => Err(LlmError::rate_limited(parse_retry_after(&error_body))),
            400 if error_body.contains("content_filter") => {
                Err(LlmError::content_filtered(error_body))
            }
            400 | 404 | 422 => Err(LlmError::InvalidRequest(error_body)),
            500..=599 => Err(LlmError::unavailable(format!(
                "Server error {}: {}",
                status, error_body
            ))),
            _ => Err(LlmError::network(format!(
                "Unexpected status {}: {}",
                status, error_body
            ))),
        }
    }
}

/// Reads "try again in Ns" from an error body; defaults to 30 seconds.
fn parse_retry_after(error_body: &str) -> u32 {
    serde_json::from_str::<Value>(error_body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .and_then(|message| {
            let rest = &message[message.find("try again in ")? + "try again in ".len()..];
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .unwrap_or(30)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: Self::messages(request.system_prompt.as_deref(), &request.messages),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: None,
            tool_choice: None,
        };
        let response: ChatResponse = self.post("chat/completions", &body).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse("No choices in response"))?;
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LlmError::content_filtered("response blocked by content filter"));
        }

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
                .unwrap_or_default(),
            model: response.model,
        })
    }

    async fn function_call(&self, request: FunctionCallRequest) -> Result<Option<FunctionCall>, LlmError> {
        let tools = request
            .functions
            .iter()
            .map(|f| OpenAiTool {
                kind: "function".to_string(),
                function: OpenAiFunction {
                    name: f.name.clone(),
                    description: f.description.clone(),
                    parameters: f.parameters.clone(),
                },
            })
            .collect();
        let body = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: Self::messages(None, &request.messages),
            max_tokens: None,
            temperature: Some(0.0),
            tools: Some(tools),
            tool_choice: Some("auto".to_string()),
        };
        let response: ChatResponse = self.post("chat/completions", &body).await?;

        let Some(call) = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.tool_calls)
            .and_then(|calls| calls.into_iter().next())
        else {
            return Ok(None);
        };

        let arguments = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.function.arguments)
                .map_err(|e| LlmError::parse(format!("Invalid tool arguments: {}", e)))?
        };
        Ok(Some(FunctionCall {
            name: call.function.name,
            arguments,
        }))
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("openai", &self.config.chat_model).with_functions(true)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::parse("No embedding in response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: texts.to_vec(),
        };
        let response: EmbeddingResponse = self
            .post("embeddings", &body)
            .await
            .map_err(embedding_error)?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(EmbeddingError::parse(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

fn embedding_error(err: LlmError) -> EmbeddingError {
    match err {
        LlmError::AuthenticationFailed => EmbeddingError::AuthenticationFailed,
        LlmError::Network(message) => EmbeddingError::Network(message),
        LlmError::Parse(message) => EmbeddingError::Parse(message),
        LlmError::Timeout { timeout_secs } => EmbeddingError::Timeout { timeout_secs },
        other => EmbeddingError::unavailable(other.to_string()),
    }
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    /// JSON-encoded arguments object.
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_from_settings_requires_key() {
        let mut settings = AiConfig::default();
        assert!(OpenAiConfig::from_settings(&settings).is_none());

        settings.api_key = Some(Secret::new("sk-test".to_string()));
        settings.base_url = "https://llm.example.com/v1/".to_string();
        let config = OpenAiConfig::from_settings(&settings).unwrap();
        assert_eq!(config.base_url, "https://llm.example.com/v1");
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.api_key(), "sk-test");
    }

    #[test]
    fn system_prompt_comes_first() {
        let messages = OpenAiProvider::messages(
            Some("be brief"),
            &[PromptMessage {
                role: PromptRole::User,
                content: "selam".to_string(),
            }],
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content.as_deref(), Some("selam"));
    }

    #[test]
    fn retry_after_is_parsed_from_error_message() {
        let body = json!({"error": {"message": "Rate limit reached. Please try again in 12s."}}).to_string();
        assert_eq!(parse_retry_after(&body), 12);
        assert_eq!(parse_retry_after("not json"), 30);
    }

    #[test]
    fn tool_call_response_deserializes() {
        let raw = json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "c1", "type": "function",
                        "function": {"name": "order_status", "arguments": "{\"order_id\":\"A1\"}"}}]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let call = &response.choices[0].message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.name, "order_status");
    }

    #[test]
    fn embedding_errors_keep_their_kind() {
        assert!(matches!(
            embedding_error(LlmError::timeout(5.0)),
            EmbeddingError::Timeout { .. }
        ));
        assert!(matches!(
            embedding_error(LlmError::rate_limited(3)),
            EmbeddingError::Unavailable(_)
        ));
    }
}
