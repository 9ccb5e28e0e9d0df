//! Request builder: prompt assembly and message-list construction.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use shared::chat::{ChatMessage, ImageUrlData, MessageContent, MessagePart, Role};
use shared::media::image_mime_type;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// System prompt used in continuous-dialogue mode when the history does not
/// already carry one.
pub const DEFAULT_HISTORY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant analyzing transcripts from meetings or conversations.";

/// I/O failures surfaced before any network dispatch is attempted.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read transcript {path}: {source}")]
    TranscriptRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The five prompt segments, in their fixed concatenation order.
#[derive(Debug, Clone, Default)]
pub struct PromptParts {
    pub fixed_prefix: String,
    pub user_prefix: String,
    pub transcript: String,
    pub user_suffix: String,
    pub ocr_text: String,
}

impl PromptParts {
    /// Join the segments with single newlines. Empty segments still
    /// contribute their separator; downstream consumers (and the clipboard
    /// side effect) depend on this exact shape.
    pub fn assemble(&self) -> String {
        [
            self.fixed_prefix.as_str(),
            self.user_prefix.as_str(),
            self.transcript.as_str(),
            self.user_suffix.as_str(),
            self.ocr_text.as_str(),
        ]
        .join("\n")
    }
}

/// Append the auxiliary-mode instruction to the prompt. The history manager
/// records the original prompt, never this augmented one.
pub fn apply_auxiliary(prompt: &str, auxiliary: &str) -> String {
    if prompt.is_empty() || auxiliary.is_empty() {
        prompt.to_string()
    } else {
        format!("{}\n\n{}", prompt, auxiliary)
    }
}

/// Build the outbound OpenAI-shaped message list.
///
/// A system message is prepended only when the user message carries no image
/// parts, unless the resolved provider is known to accept the combination.
/// In continuous-dialogue mode the prior turns are spliced in and a default
/// system prompt is supplied if the history lacks one.
pub fn build_messages(
    final_prompt: &str,
    image_paths: &[PathBuf],
    history: &[ChatMessage],
    use_history: bool,
    allow_system_with_images: bool,
) -> Result<Vec<ChatMessage>, PromptError> {
    let has_images = !image_paths.is_empty();
    let system_allowed = !has_images || allow_system_with_images;

    let mut messages: Vec<ChatMessage> = Vec::new();
    if use_history {
        let history_has_system = history
            .first()
            .map(|m| m.role == Role::System)
            .unwrap_or(false);
        if system_allowed && !history_has_system {
            messages.push(ChatMessage::text(Role::System, DEFAULT_HISTORY_SYSTEM_PROMPT));
        }
        messages.extend(history.iter().cloned());
    } else if system_allowed {
        messages.push(ChatMessage::text(Role::System, ""));
    }

    if final_prompt.is_empty() && !has_images {
        return Ok(messages);
    }

    let content = if has_images {
        let mut parts: Vec<MessagePart> = Vec::new();
        if !final_prompt.is_empty() {
            parts.push(MessagePart::Text {
                text: final_prompt.to_string(),
            });
        }
        for path in image_paths {
            parts.push(MessagePart::ImageUrl {
                image_url: ImageUrlData {
                    url: image_data_url(path)?,
                },
            });
        }
        MessageContent::Parts(parts)
    } else {
        MessageContent::Text(final_prompt.to_string())
    };

    messages.push(ChatMessage {
        role: Role::User,
        content,
    });
    Ok(messages)
}

/// Read an image and embed it as a base64 data URL.
fn image_data_url(path: &Path) -> Result<String, PromptError> {
    let bytes = fs::read(path).map_err(|source| PromptError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(format!(
        "data:{};base64,{}",
        image_mime_type(path),
        BASE64.encode(bytes)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_joins_all_five_segments_with_newlines() {
        let parts = PromptParts {
            fixed_prefix: "P".into(),
            user_prefix: String::new(),
            transcript: "T".into(),
            user_suffix: "S".into(),
            ocr_text: String::new(),
        };
        assert_eq!(parts.assemble(), "P\n\nT\nS\n");
    }

    #[test]
    fn assemble_of_all_empty_segments_is_four_newlines() {
        assert_eq!(PromptParts::default().assemble(), "\n\n\n\n");
    }

    #[test]
    fn auxiliary_appends_with_blank_line_when_both_present() {
        assert_eq!(apply_auxiliary("ask", "summarize"), "ask\n\nsummarize");
        assert_eq!(apply_auxiliary("ask", ""), "ask");
        assert_eq!(apply_auxiliary("", "summarize"), "");
    }

    #[test]
    fn one_shot_prompt_gets_empty_system_message() {
        let msgs = build_messages("hello", &[], &[], false, false).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[0].content.text(), "");
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[1].content.text(), "hello");
    }

    #[test]
    fn image_request_omits_system_message_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("shot.png");
        fs::write(&img, b"\x89PNG").unwrap();

        let msgs = build_messages("look", &[img.clone()], &[], false, false).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, Role::User);
        assert!(msgs[0].content.has_image());

        let with_system = build_messages("look", &[img], &[], false, true).unwrap();
        assert_eq!(with_system.len(), 2);
        assert_eq!(with_system[0].role, Role::System);
    }

    #[test]
    fn image_data_url_carries_mime_and_base64() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("shot.png");
        fs::write(&img, b"abc").unwrap();
        let url = image_data_url(&img).unwrap();
        assert_eq!(url, "data:image/png;base64,YWJj");
    }

    #[test]
    fn missing_image_is_an_error_before_dispatch() {
        let err = build_messages("x", &[PathBuf::from("/no/such/img.png")], &[], false, false)
            .unwrap_err();
        assert!(matches!(err, PromptError::ImageRead { .. }));
    }

    #[test]
    fn history_mode_supplies_default_system_prompt_when_missing() {
        let history = vec![
            ChatMessage::text(Role::User, "q1"),
            ChatMessage::text(Role::Assistant, "a1"),
        ];
        let msgs = build_messages("q2", &[], &history, true, false).unwrap();
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[0].content.text(), DEFAULT_HISTORY_SYSTEM_PROMPT);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[3].content.text(), "q2");
    }

    #[test]
    fn history_mode_keeps_existing_system_prompt() {
        let history = vec![
            ChatMessage::text(Role::System, "custom"),
            ChatMessage::text(Role::User, "q1"),
        ];
        let msgs = build_messages("q2", &[], &history, true, false).unwrap();
        assert_eq!(msgs[0].content.text(), "custom");
        assert_eq!(msgs.len(), 3);
    }

    #[test]
    fn empty_prompt_without_images_adds_no_user_message() {
        let msgs = build_messages("", &[], &[], false, false).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, Role::System);
    }
}
