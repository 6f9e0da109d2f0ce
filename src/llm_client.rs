// src/llm_client.rs
//
// Async HTTP client for the language-model collaborator, speaking the
// OpenAI-style chat-completions protocol. The client is deliberately dumb:
// it ships a prepared message list, retries transient failures with a fixed
// delay, and hands the raw completion text back to the textual IR stage for
// extraction and post-processing.

use crate::types::LlmConfig;
use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// WIRE TYPES
// ============================================================================

/// One chat turn. `content` is either a plain string or the multi-part
/// array used for image attachments, so it stays a raw JSON value.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: serde_json::Value,
}

impl ChatMessage {
    pub fn text(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: serde_json::Value::String(content.to_string()),
        }
    }

    /// A user turn carrying both text and a base64-encoded reference image.
    pub fn with_image(role: &'static str, text: &str, image: &[u8], mime: &str) -> Self {
        let b64 = base64::engine::general_purpose::STANDARD.encode(image);
        Self {
            role,
            content: serde_json::json!([
                { "type": "text", "text": text },
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:{};base64,{}", mime, b64) }
                }
            ]),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct LlmClient {
    api_base: String,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
    max_tries: u32,
    retry_delay: Duration,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY is not set in the environment")?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(200))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            http_client,
            max_tries: config.max_tries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    /// Run one completion, retrying up to the configured attempt count.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut last_error = None;
        for attempt in 1..=self.max_tries {
            match self.call(messages).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    warn!(
                        "LLM request failed (attempt {}/{}): {:#}",
                        attempt, self.max_tries, e
                    );
                    last_error = Some(e);
                    if attempt < self.max_tries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no attempts made")))
            .with_context(|| format!("LLM request failed after {} attempts", self.max_tries))
    }

    async fn call(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: &self.model,
            messages,
        };
        debug!("sending {} messages to {}", messages.len(), url);

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("reaching the LLM server")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {}: {}", status, body);
        }

        let parsed: ChatResponse = resp.json().await.context("parsing the LLM response")?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("LLM response contained no choices")?;
        Ok(choice.message.content)
    }
}
