//! JSON-over-HTTP plumbing shared by the OpenAI-compatible clients.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{LlmError, Result};

/// A base URL plus optional bearer token.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

/// `{"error": {"message": "..."}}`, the error body these APIs return.
#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: String,
}

impl ApiClient {
    pub(crate) fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// POST `body` to `path` and decode the JSON reply.
    pub(crate) async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .authorize(self.http.post(self.url(path)))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        let text = check_status(response).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// GET `path` and only check the status.
    pub(crate) async fn probe(&self, path: &str) -> Result<()> {
        let response = self
            .authorize(self.http.get(self.url(path)))
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::from_status(status.as_u16(), error_message(&body)))
}

/// The provider's message if the body is an error envelope, else the body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().to_string(),
    }
}
