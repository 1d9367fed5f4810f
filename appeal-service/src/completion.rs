//! Transport to the completion service.
//!
//! Extraction and generation only talk to [`CompletionClient`]; the HTTP
//! adapter below is swapped for a canned client in tests (the `test-util`
//! feature exposes it to integration tests).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::config::ServiceConfig;
use crate::error::{AppealError, Result};

#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedCompletionClient;

pub const API_VERSION: &str = "2023-06-01";

/// A single-message completion request, minus the model which the client owns
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub max_tokens: u32,
    /// Either a plain instruction string or an array of content blocks
    pub content: Value,
}

/// Port to the completion service. Returns the raw text of the first content block.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// HTTP adapter for the Messages API
#[derive(Clone)]
pub struct MessagesApiClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl MessagesApiClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| AppealError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn payload(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": request.content
                }
            ]
        })
    }
}

#[async_trait]
impl CompletionClient for MessagesApiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let payload = self.payload(&request);

        info!(
            model = %self.model,
            max_tokens = request.max_tokens,
            "Sending completion request"
        );

        let response = self
            .http
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Completion request failed: {}", e);
                AppealError::NetworkFailure(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Completion request failed with status {}", status);
            return Err(AppealError::HttpStatusError {
                code: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppealError::NetworkFailure(e.to_string()))?;

        first_text_block(&body)
    }
}

/// Pull `content[0].text` out of a Messages API response body
pub fn first_text_block(body: &str) -> Result<String> {
    let response_json: Value = serde_json::from_str(body)
        .map_err(|e| AppealError::malformed(body, format!("response body is not JSON: {}", e)))?;

    response_json["content"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AppealError::malformed(body, "response has no content[0].text"))
}

#[cfg(any(test, feature = "test-util"))]
mod scripted {
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::{CompletionClient, CompletionRequest};
    use crate::error::{AppealError, Result};
    use crate::utils::lock;

    /// Replays queued responses in order and records every request it receives
    #[derive(Default)]
    pub struct ScriptedCompletionClient {
        responses: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletionClient {
        pub fn new(responses: impl IntoIterator<Item = Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            lock(&self.requests).clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletionClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            lock(&self.requests).push(request);
            lock(&self.responses).pop_front().unwrap_or_else(|| {
                Err(AppealError::NetworkFailure(
                    "no scripted response left".to_string(),
                ))
            })
        }
    }
}
