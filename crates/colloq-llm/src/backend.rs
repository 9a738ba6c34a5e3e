//! LLM backend trait and shared helpers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Retry
// ─────────────────────────────────────────────────────────────────────────────

/// Run `f` with exponential backoff, retrying only retryable errors.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A chat completion provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Check if the backend is available and properly configured.
    async fn health_check(&self) -> Result<()>;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted backend for tests.
///
/// Replies are returned in order. Once the script runs out, the last reply is
/// repeated; an empty script fails every request.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    replies: Mutex<Vec<std::result::Result<String, String>>>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Create a mock backend that replies with each text in turn.
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            name: "mock".to_string(),
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend that always replies with `text`.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![text.into()])
    }

    /// Create a mock backend whose every request fails with a backend error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            replies: Mutex::new(vec![Err(message.into())]),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        let count = {
            let mut log = self.request_log.lock();
            log.push(request);
            log.len()
        };

        let reply = {
            let mut replies = self.replies.lock();
            match replies.len() {
                0 => Err("MockBackend: no replies configured".to_string()),
                1 => replies[0].clone(),
                _ => replies.remove(0),
            }
        };

        match reply {
            Ok(text) => Ok(CompletionResponse::new(
                format!("mock_msg_{count}"),
                model,
                text,
                StopReason::EndTurn,
                Usage::new(10, 20),
            )),
            Err(message) => Err(LlmError::Backend(message)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
