//! Completion-service client
//!
//! Talks to an OpenAI-compatible chat-completions endpoint with client-side
//! rate limiting and per-call timeouts. This is the production
//! `CompletionService`; agents never see HTTP details.

use crate::config::ValidationConfig;
use crate::error::{EngineError, EngineResult};
use crate::sources::{CompletionRequest, CompletionResponse, CompletionService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const USER_AGENT: &str = concat!("cropwatch/", env!("CARGO_PKG_VERSION"));

/// Minimum-interval limiter shared across concurrent callers
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ============================================================================
// Wire types (chat-completions subset)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// ============================================================================
// Client
// ============================================================================

pub struct LlmClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
}

impl LlmClient {
    pub fn new(config: &ValidationConfig, api_key: String) -> EngineResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .build()
            .map_err(|e| EngineError::Agent(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            rate_limiter: Arc::new(RateLimiter::new(config.min_call_interval_ms)),
        })
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> EngineResult<CompletionResponse> {
        self.rate_limiter.wait().await;

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system_prompt },
                ChatMessage { role: "user", content: &request.user_prompt },
            ],
            max_tokens: request.max_tokens,
            response_format: request
                .json_response
                .then_some(ResponseFormat { format_type: "json_object" }),
        };

        debug!(model = %self.model, url = %url, "Issuing completion call");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Agent(format!("completion call failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EngineError::Agent("completion service rate limited".to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Agent(format!(
                "completion service returned {status}: {error_text}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Agent(format!("completion response parse failed: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::Agent("completion response had no choices".to_string()))?;

        Ok(CompletionResponse {
            content,
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        })
    }
}
