//! Chat completions against any OpenAI-compatible endpoint.
//!
//! Used for summaries, so only non-streaming `/chat/completions` is
//! supported. Works with OpenAI itself, Ollama, vLLM and similar gateways.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{LlmBackend, with_retry};
use crate::error::Result;
use crate::http::ApiClient;
use crate::types::{ChatMessage, CompletionRequest, CompletionResponse, StopReason, Usage};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Bearer token. Local servers usually need none.
    pub api_key: Option<String>,
    pub base_url: String,
    /// When set, replaces the model named in each request.
    pub model: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    /// First retry delay; doubles per attempt.
    pub retry_backoff: Duration,
    /// Label used in logs and by [`LlmBackend::name`].
    pub name: String,
}

impl OpenAiConfig {
    fn base(name: &str, base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            base_url: base_url.to_string(),
            model: None,
            timeout,
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            name: name.to_string(),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::base(
            "openai",
            OPENAI_BASE_URL,
            Some(api_key.into()),
            Duration::from_secs(60),
        )
    }

    /// Keyless local server. Local models are slow, so the timeout is long.
    pub fn ollama() -> Self {
        Self::base("ollama", OLLAMA_BASE_URL, None, Duration::from_secs(300))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// [`LlmBackend`] over `/chat/completions`.
pub struct OpenAiBackend {
    api: ApiClient,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let api = ApiClient::new(&config.base_url, config.api_key.clone(), config.timeout)?;
        Ok(Self { api, config })
    }

    fn wire_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: self.config.model.as_deref().unwrap_or(&request.model),
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.wire_request(&request);
        debug!(
            backend = %self.config.name,
            model = body.model,
            messages = body.messages.len(),
            "Sending chat completion"
        );

        let reply: ChatReply = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || self.api.post_json("chat/completions", &body),
        )
        .await?;
        Ok(reply.into_response())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn health_check(&self) -> Result<()> {
        self.api.probe("models").await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl ChatReply {
    fn into_response(self) -> CompletionResponse {
        let usage = self
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let first = self.choices.into_iter().next();
        let stop = match first.as_ref().and_then(|c| c.finish_reason.as_deref()) {
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };
        let text = first
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        CompletionResponse::new(self.id, self.model, text, stop, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = OpenAiConfig::openai("sk-test")
            .with_base_url("http://localhost:8000/v1/")
            .with_model("gpt-4o-mini")
            .with_name("summary")
            .with_max_retries(1);
        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.name, "summary");
        assert_eq!(config.max_retries, 1);

        let local = OpenAiConfig::ollama();
        assert!(local.api_key.is_none());
        assert_eq!(local.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_configured_model_wins() {
        let backend = OpenAiBackend::new(OpenAiConfig::openai("k").with_model("fixed")).unwrap();
        let request = CompletionRequest::new("ignored", vec![ChatMessage::user("hi")], 50)
            .with_temperature(0.3);

        let json = serde_json::to_value(backend.wire_request(&request)).unwrap();
        assert_eq!(json["model"], "fixed");
        assert_eq!(json["max_tokens"], 50);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_request_model_used_without_override() {
        let backend = OpenAiBackend::new(OpenAiConfig::ollama()).unwrap();
        let request = CompletionRequest::new("llama3.2", vec![ChatMessage::user("hi")], 10);
        let json = serde_json::to_value(backend.wire_request(&request)).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_reply_conversion() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": "User discussing pfSense."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 8}
        }"#;
        let response = serde_json::from_str::<ChatReply>(body)
            .unwrap()
            .into_response();
        assert_eq!(response.text(), "User discussing pfSense.");
        assert_eq!(response.usage, Usage::new(40, 8));
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
    }

    #[test]
    fn test_truncated_reply() {
        let body = r#"{"choices": [{"message": {"content": "User disc"}, "finish_reason": "length"}]}"#;
        let response = serde_json::from_str::<ChatReply>(body)
            .unwrap()
            .into_response();
        assert_eq!(response.stop_reason, Some(StopReason::MaxTokens));
    }

    #[test]
    fn test_reply_without_choices() {
        let response = serde_json::from_str::<ChatReply>(r#"{"choices": []}"#)
            .unwrap()
            .into_response();
        assert!(response.text().is_empty());
    }
}
