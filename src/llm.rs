//! LLM provider seam: a streaming chat primitive plus availability probe.
//!
//! The orchestrator depends only on the [`ChatModel`] trait, which keeps
//! the loop testable with scripted models and leaves the provider protocol
//! swappable. The production implementation, [`LlmClient`], speaks the
//! OpenAI-compatible chat completions API over SSE.
//!
//! # Stream Contract
//!
//! `stream_chat` yields [`ChatChunk::Content`] deltas as they arrive and
//! [`ChatChunk::Done`] on the provider's end-of-stream sentinel. Stream
//! items can individually be errors; the orchestrator surfaces those as
//! `LLM_ERROR` and ends the turn. The whole call is bounded by the
//! configured overall timeout (generous by default; large models stream
//! slowly).

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::{Error, Result};

/// One message in the LLM conversation, provider wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant"
    pub role: String,

    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One item on the model's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatChunk {
    /// A text delta
    Content(String),
    /// End-of-generation sentinel
    Done,
}

/// Stream of chunks from the model.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// The streaming chat primitive the orchestrator drives.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Starts a streamed completion over the given message list.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChunkStream>;

    /// Cheap availability probe, used before entering the loop.
    async fn is_available(&self) -> bool;
}

// ============================================================================
// OPENAI-COMPATIBLE WIRE TYPES
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible streaming client.
pub struct LlmClient {
    http: reqwest::Client,
    probe_http: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl LlmClient {
    /// Builds a client from the agent configuration.
    ///
    /// The main client carries the overall per-call timeout; the probe
    /// client uses a short one so health checks stay fast.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.llm_timeout())
            .build()
            .map_err(Error::Transport)?;
        let probe_http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(Error::Transport)?;

        Ok(Self {
            http,
            probe_http,
            model: config.model().to_string(),
            base_url: config.llm_base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key().to_string(),
            temperature: config.temperature(),
            max_tokens: config.max_tokens(),
        })
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChunkStream> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            stream: true,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Deadline
                } else {
                    Error::Transport(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::llm(format!("API error {}: {}", status, body)));
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        // The stream ends with a "[DONE]" sentinel that is
                        // not JSON.
                        if event.data == "[DONE]" {
                            return Some(Ok(ChatChunk::Done));
                        }
                        match serde_json::from_str::<CompletionChunk>(&event.data) {
                            Ok(chunk) => {
                                let content: String = chunk
                                    .choices
                                    .into_iter()
                                    .filter_map(|choice| choice.delta.content)
                                    .collect();
                                if content.is_empty() {
                                    None
                                } else {
                                    Some(Ok(ChatChunk::Content(content)))
                                }
                            }
                            Err(e) => Some(Err(Error::llm(format!(
                                "undecodable stream chunk: {}",
                                e
                            )))),
                        }
                    }
                    Err(e) => Some(Err(Error::llm(e.to_string()))),
                }
            });

        Ok(Box::pin(stream))
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.probe_http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("LLM availability probe failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
    }

    #[test]
    fn test_request_serialization_skips_absent_max_tokens() {
        let messages = vec![ChatMessage::user("hi")];
        let request = CompletionRequest {
            model: "m",
            messages: &messages,
            stream: true,
            temperature: 0.7,
            max_tokens: None,
        };
        let raw = serde_json::to_string(&request).unwrap();
        assert!(!raw.contains("max_tokens"));
        assert!(raw.contains("\"stream\":true"));
    }

    #[test]
    fn test_chunk_deserialization() {
        let raw = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let chunk: CompletionChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
    }

    #[test]
    fn test_chunk_with_empty_delta() {
        let raw = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let chunk: CompletionChunk = serde_json::from_str(raw).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn test_client_normalizes_base_url() {
        let config = AgentConfig::builder()
            .llm_base_url("http://localhost:1234/v1/")
            .build()
            .unwrap();
        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:1234/v1");
    }
}
