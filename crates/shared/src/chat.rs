//! Wire-level chat types shared by the provider adapters and the relay.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One typed part of a multimodal message (OpenAI content-part shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagePart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrlData {
    pub url: String,
}

/// Message body: plain text, or an ordered part list when images are attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

impl MessageContent {
    /// Concatenated text of the message, ignoring image parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    MessagePart::Text { text } => Some(text.as_str()),
                    MessagePart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, MessageContent::Parts(parts)
            if parts.iter().any(|p| matches!(p, MessagePart::ImageUrl { .. })))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }
}

/// One event pushed by a provider adapter into the delta channel.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Incremental text fragment. Empty fragments are valid no-ops.
    Text(String),
    /// Provider signalled end of stream.
    Done,
}

/// How a provider stream wound down when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Completed,
    Cancelled,
}

/// Cooperative stop signal, polled by adapters between chunks and uploads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Transient value object describing one user-initiated fetch.
///
/// `messages` is the OpenAI-shaped message list built by the request builder.
/// The Gemini adapter ignores it and rebuilds native `Content` structures from
/// `prompt_text`, `history` and `image_paths` instead, since its wire format
/// (and image handling) differs.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Possibly bracket-tagged model identifier, e.g. `"[Groq] llama-3.1-70b"`.
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    /// Final user-facing prompt text (auxiliary suffix already applied).
    pub prompt_text: String,
    /// Prior turns, oldest first. Empty unless continuous dialogue is on.
    pub history: Vec<ChatMessage>,
    pub image_paths: Vec<PathBuf>,
    pub use_history: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_text_ignores_image_parts() {
        let content = MessageContent::Parts(vec![
            MessagePart::Text {
                text: "hello".into(),
            },
            MessagePart::ImageUrl {
                image_url: ImageUrlData {
                    url: "data:image/png;base64,AAAA".into(),
                },
            },
        ]);
        assert_eq!(content.text(), "hello");
        assert!(content.has_image());
    }

    #[test]
    fn cancel_flag_is_sticky() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
        let clone = flag.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn message_parts_serialize_openai_shape() {
        let msg = ChatMessage {
            role: Role::User,
            content: MessageContent::Parts(vec![MessagePart::Text { text: "hi".into() }]),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][0]["text"], "hi");
    }
}
