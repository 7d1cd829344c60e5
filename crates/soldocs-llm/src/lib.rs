//! Text generation over the Anthropic Messages API.
//!
//! The client enforces a coarse pacing gate (at least 500 ms between call
//! starts) and retries transient provider errors. It is safe for concurrent
//! callers; the pacing state is serialized internally.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soldocs_core::{Result, SolDocsError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Minimum spacing between call starts. A pacing gate, not a concurrency
/// limit.
const MIN_CALL_SPACING: Duration = Duration::from_millis(500);

const MAX_ATTEMPTS: u32 = 3;
const RETRYABLE_MARKERS: [&str; 3] = ["429", "500", "529"];

/// The generation seam the doc pipeline depends on. Mocked in tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

pub struct AnthropicClient {
    config: AnthropicConfig,
    http: reqwest::Client,
    last_call_started_at: Mutex<Option<Instant>>,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(SolDocsError::Configuration(
                "Anthropic API key is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| SolDocsError::Llm(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            config,
            http,
            last_call_started_at: Mutex::new(None),
        })
    }

    /// Sleep out the remainder of the pacing window, then stamp this call's
    /// start so the next caller measures from it.
    async fn pace(&self) {
        let mut last = self.last_call_started_at.lock().await;
        if let Some(started) = *last {
            let elapsed = started.elapsed();
            if elapsed < MIN_CALL_SPACING {
                tokio::time::sleep(MIN_CALL_SPACING - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn request(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http
            .post(format!("{ANTHROPIC_API_BASE}/messages"))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| SolDocsError::Llm(format!("LLM transport error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SolDocsError::Llm(format!(
                "LLM API error {}: {}",
                status.as_u16(),
                text
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|err| SolDocsError::Llm(format!("Malformed LLM response: {err}")))?;
        Ok(extract_text(&parsed))
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let mut attempt = 0;
        loop {
            self.pace().await;
            match self.request(prompt, max_tokens).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "LLM generation complete");
                    return Ok(text);
                }
                Err(err) => {
                    let message = err.to_string();
                    let retryable = RETRYABLE_MARKERS
                        .iter()
                        .any(|marker| message.contains(marker));
                    if !retryable || attempt + 1 == MAX_ATTEMPTS {
                        return Err(err);
                    }
                    let backoff = Duration::from_millis(2u64.pow(attempt) * 2000);
                    warn!(
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %message,
                        "Transient LLM error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// The text of the first `text`-kind content block, or empty when none.
fn extract_text(response: &MessagesResponse) -> String {
    response
        .content
        .iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text.clone())
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_rejected() {
        assert!(AnthropicClient::new(AnthropicConfig::new("")).is_err());
    }

    #[test]
    fn extracts_first_text_block() {
        let response: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"}
            ]
        }))
        .expect("parse");
        assert_eq!(extract_text(&response), "first");
    }

    #[test]
    fn empty_content_yields_empty_string() {
        let response: MessagesResponse =
            serde_json::from_value(serde_json::json!({"content": []})).expect("parse");
        assert_eq!(extract_text(&response), "");
    }

    #[tokio::test]
    async fn pacing_spaces_out_call_starts() {
        let client = AnthropicClient::new(AnthropicConfig::new("sk-ant-test")).expect("client");
        let start = Instant::now();
        client.pace().await;
        client.pace().await;
        assert!(start.elapsed() >= MIN_CALL_SPACING);
    }
}
