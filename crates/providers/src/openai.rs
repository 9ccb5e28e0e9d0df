//! Streaming client for OpenAI-compatible chat-completion endpoints.
//!
//! Covers every bracket-tagged provider except native Gemini: one streaming
//! POST per request, SSE chunks parsed incrementally, each chunk contributing
//! at most one text delta. The cancel flag is polled between chunks.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use shared::chat::{CancelFlag, ChatMessage, StreamChunk, StreamEnd, StreamRequest};
use tokio::sync::mpsc::UnboundedSender;

use crate::registry::{quirks_for, ProviderProfile};
use crate::sse::SseParser;
use crate::{StreamProducer, SHARED_HTTP};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    stream: bool,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// The message types serialize directly into the OpenAI wire shape; the
/// adapter only needs them as opaque JSON values.
fn to_wire_messages(messages: &[ChatMessage]) -> Result<Vec<serde_json::Value>> {
    messages
        .iter()
        .map(|m| serde_json::to_value(m).map_err(|e| anyhow!("message encode error: {}", e)))
        .collect()
}

pub struct OpenAIClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

impl OpenAIClient {
    pub fn new(profile: &ProviderProfile, bare_model: String, request: &StreamRequest) -> Self {
        Self {
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            api_key: profile.api_key.clone(),
            model: bare_model,
            temperature: request.temperature,
            messages: request.messages.clone(),
        }
    }

    async fn stream_inner(
        &self,
        cancel: &CancelFlag,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamEnd> {
        let url = format!("{}/chat/completions", self.base_url);
        let quirks = quirks_for(&self.model);
        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages: to_wire_messages(&self.messages)?,
            stream: true,
            // Forwarded verbatim; range validation is the caller's job.
            temperature: self.temperature,
            top_p: 1.0,
            max_completion_tokens: quirks.max_completion_tokens,
        };

        tracing::debug!(model = %self.model, url = %url, "opening chat-completions stream");
        let resp = SHARED_HTTP
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            if detail.trim().is_empty() {
                return Err(anyhow!("provider error: {}", status));
            }
            return Err(anyhow!("provider error: {}\n{}", status, detail));
        }

        let mut parser = SseParser::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                tracing::debug!(model = %self.model, "stream cancelled by caller");
                return Ok(StreamEnd::Cancelled);
            }
            let bytes = chunk.map_err(|e| anyhow!("stream read error: {}", e))?;
            for event in parser.feed(&bytes) {
                if event.data == "[DONE]" {
                    let _ = tx.send(StreamChunk::Done);
                    return Ok(StreamEnd::Completed);
                }
                match serde_json::from_str::<StreamResponse>(&event.data) {
                    Ok(resp) => {
                        if let Some(choice) = resp.choices.first() {
                            if let Some(content) = &choice.delta.content {
                                // Empty deltas are valid keepalives.
                                if !content.is_empty() {
                                    let _ = tx.send(StreamChunk::Text(content.clone()));
                                }
                            }
                            if choice.finish_reason.is_some() {
                                let _ = tx.send(StreamChunk::Done);
                                return Ok(StreamEnd::Completed);
                            }
                        }
                    }
                    Err(_) => {
                        // Unparseable SSE payloads (pings, comments) are skipped.
                    }
                }
            }
        }

        let _ = tx.send(StreamChunk::Done);
        Ok(StreamEnd::Completed)
    }
}

#[async_trait]
impl StreamProducer for OpenAIClient {
    async fn stream(
        &self,
        cancel: &CancelFlag,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamEnd> {
        self.stream_inner(cancel, tx).await
    }
}
