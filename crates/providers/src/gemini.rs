//! Native Gemini streaming client.
//!
//! Used when a model resolves to the `Gemini` tag: history entries are mapped
//! role-for-role onto `Content` structures (`assistant` → `model`), images are
//! uploaded out-of-band and referenced by URI, and the generation call streams
//! over SSE. The system instruction travels outside the content list.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use shared::chat::{CancelFlag, ChatMessage, Role, StreamChunk, StreamEnd, StreamRequest};
use shared::media::image_mime_type;
use shared::settings::GeminiOptions;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

use crate::sse::SseParser;
use crate::{StreamProducer, SHARED_HTTP};

const API_BASE: &str = "https://generativelanguage.googleapis.com";

/// The only model that honors a thinking budget.
const THINKING_MODEL: &str = "gemini-2.5-flash-preview-04-17";
const THINKING_BUDGET_MAX: i32 = 24576;

const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a professional assistant analyzing meeting and conversation transcripts.";
const SEARCH_COMMAND_PREFIX: &str =
    "Use the Google Search tool to look up the latest information before answering:\n\n";
const SEARCH_REMINDER: &str =
    "Note: the search tool is enabled; ground the answer in the retrieved results.";

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    file_uri: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct StreamGenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    uri: String,
    mime_type: String,
}

// ── Client ───────────────────────────────────────────────────────────

pub struct GeminiClient {
    api_key: String,
    model: String,
    temperature: f32,
    prompt_text: String,
    history: Vec<ChatMessage>,
    use_history: bool,
    image_paths: Vec<PathBuf>,
    options: GeminiOptions,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        bare_model: String,
        request: &StreamRequest,
        options: GeminiOptions,
    ) -> Self {
        Self {
            api_key,
            model: bare_model,
            temperature: request.temperature,
            prompt_text: request.prompt_text.clone(),
            history: request.history.clone(),
            use_history: request.use_history,
            image_paths: request.image_paths.clone(),
            options,
        }
    }

    /// Map prior turns onto Gemini roles. System entries are skipped; the
    /// system instruction is supplied separately.
    fn history_contents(&self) -> Vec<Content> {
        if !self.use_history {
            return Vec::new();
        }
        self.history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: match m.role {
                    Role::Assistant => "model".to_string(),
                    _ => "user".to_string(),
                },
                parts: vec![Part::Text {
                    text: m.content.text(),
                }],
            })
            .collect()
    }

    fn outgoing_text(&self) -> String {
        if self.options.enable_search && !self.prompt_text.is_empty() {
            format!("{}{}", SEARCH_COMMAND_PREFIX, self.prompt_text)
        } else {
            self.prompt_text.clone()
        }
    }

    fn system_instruction_text(&self) -> String {
        if self.options.enable_search {
            format!("{}\n{}", DEFAULT_SYSTEM_INSTRUCTION, SEARCH_REMINDER)
        } else {
            DEFAULT_SYSTEM_INSTRUCTION.to_string()
        }
    }

    fn thinking_config(&self) -> Option<ThinkingConfig> {
        if self.model != THINKING_MODEL {
            return None;
        }
        self.options
            .thinking_budget
            .filter(|b| (0..=THINKING_BUDGET_MAX).contains(b))
            .map(|thinking_budget| ThinkingConfig { thinking_budget })
    }

    /// Upload one image and return a file-reference part. Raw upload
    /// protocol: the whole file in one request body.
    async fn upload_image(&self, path: &PathBuf) -> Result<Part> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow!("image read error for {}: {}", path.display(), e))?;
        let mime = image_mime_type(path);
        let url = format!("{}/upload/v1beta/files?key={}", API_BASE, self.api_key);
        let resp = SHARED_HTTP
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", mime)
            .body(bytes)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            return Err(anyhow!("gemini upload error: {}\n{}", status, detail));
        }
        let uploaded: UploadResponse = resp.json().await?;
        tracing::debug!(path = %path.display(), uri = %uploaded.file.uri, "uploaded image");
        Ok(Part::FileData {
            file_data: FileData {
                file_uri: uploaded.file.uri,
                mime_type: uploaded.file.mime_type,
            },
        })
    }

    async fn stream_inner(
        &self,
        cancel: &CancelFlag,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamEnd> {
        let mut contents = self.history_contents();

        let mut user_parts: Vec<Part> = Vec::new();
        let text = self.outgoing_text();
        if !text.is_empty() {
            user_parts.push(Part::Text { text });
        }
        for path in &self.image_paths {
            // Uploads can be slow; honor a stop between each one.
            if cancel.is_cancelled() {
                return Ok(StreamEnd::Cancelled);
            }
            match self.upload_image(path).await {
                Ok(part) => user_parts.push(part),
                // A bad attachment degrades the request, it does not abort it.
                Err(e) => tracing::warn!(path = %path.display(), "image upload failed: {}", e),
            }
        }
        if !user_parts.is_empty() {
            contents.push(Content {
                role: "user".to_string(),
                parts: user_parts,
            });
        }

        let req = GenerateRequest {
            contents,
            system_instruction: Content {
                role: "system".to_string(),
                parts: vec![Part::Text {
                    text: self.system_instruction_text(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 8192,
                response_mime_type: "text/plain",
                thinking_config: self.thinking_config(),
            },
            tools: self
                .options
                .enable_search
                .then(|| vec![serde_json::json!({ "google_search": {} })]),
        };

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            API_BASE, self.model, self.api_key
        );
        tracing::debug!(model = %self.model, "opening gemini stream");
        let resp = SHARED_HTTP.post(&url).json(&req).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            if detail.trim().is_empty() {
                return Err(anyhow!("gemini error: {}", status));
            }
            return Err(anyhow!("gemini error: {}\n{}", status, detail));
        }

        let mut parser = SseParser::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                tracing::debug!(model = %self.model, "gemini stream cancelled by caller");
                return Ok(StreamEnd::Cancelled);
            }
            let bytes = chunk.map_err(|e| anyhow!("stream read error: {}", e))?;
            for event in parser.feed(&bytes) {
                let Ok(resp) = serde_json::from_str::<StreamGenerateResponse>(&event.data) else {
                    continue;
                };
                let delta: String = resp
                    .candidates
                    .first()
                    .and_then(|c| c.content.as_ref())
                    .map(|c| {
                        c.parts
                            .iter()
                            .filter_map(|p| p.text.as_deref())
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                if !delta.is_empty() {
                    let _ = tx.send(StreamChunk::Text(delta));
                }
            }
        }

        let _ = tx.send(StreamChunk::Done);
        Ok(StreamEnd::Completed)
    }
}

#[async_trait]
impl StreamProducer for GeminiClient {
    async fn stream(
        &self,
        cancel: &CancelFlag,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamEnd> {
        self.stream_inner(cancel, tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(history: Vec<ChatMessage>, use_history: bool) -> StreamRequest {
        StreamRequest {
            model: "[Gemini] gemini-1.5-flash".into(),
            temperature: 0.7,
            messages: vec![],
            prompt_text: "what changed?".into(),
            history,
            image_paths: vec![],
            use_history,
        }
    }

    fn client(request: &StreamRequest, options: GeminiOptions) -> GeminiClient {
        GeminiClient::new("key".into(), "gemini-1.5-flash".into(), request, options)
    }

    #[test]
    fn history_maps_assistant_to_model_and_skips_system() {
        let history = vec![
            ChatMessage::text(Role::System, "sys"),
            ChatMessage::text(Role::User, "q1"),
            ChatMessage::text(Role::Assistant, "a1"),
        ];
        let req = request(history, true);
        let contents = client(&req, GeminiOptions::default()).history_contents();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
    }

    #[test]
    fn history_is_empty_when_disabled() {
        let history = vec![ChatMessage::text(Role::User, "q1")];
        let req = request(history, false);
        assert!(client(&req, GeminiOptions::default())
            .history_contents()
            .is_empty());
    }

    #[test]
    fn search_prefixes_prompt_and_extends_instruction() {
        let req = request(vec![], false);
        let c = client(
            &req,
            GeminiOptions {
                enable_search: true,
                thinking_budget: None,
            },
        );
        assert!(c.outgoing_text().starts_with(SEARCH_COMMAND_PREFIX));
        assert!(c.outgoing_text().ends_with("what changed?"));
        assert!(c.system_instruction_text().contains(SEARCH_REMINDER));

        let plain = client(&req, GeminiOptions::default());
        assert_eq!(plain.outgoing_text(), "what changed?");
        assert_eq!(plain.system_instruction_text(), DEFAULT_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn thinking_budget_applies_to_one_model_only() {
        let req = request(vec![], false);
        let opts = GeminiOptions {
            enable_search: false,
            thinking_budget: Some(1024),
        };
        let other = GeminiClient::new("k".into(), "gemini-1.5-flash".into(), &req, opts.clone());
        assert!(other.thinking_config().is_none());

        let thinking = GeminiClient::new("k".into(), THINKING_MODEL.into(), &req, opts);
        assert_eq!(thinking.thinking_config().unwrap().thinking_budget, 1024);

        let out_of_range = GeminiOptions {
            enable_search: false,
            thinking_budget: Some(THINKING_BUDGET_MAX + 1),
        };
        let rejected = GeminiClient::new("k".into(), THINKING_MODEL.into(), &req, out_of_range);
        assert!(rejected.thinking_config().is_none());
    }

    #[test]
    fn request_serializes_camel_case_fields() {
        let req = GenerateRequest {
            contents: vec![Content {
                role: "user".into(),
                parts: vec![Part::Text { text: "hi".into() }],
            }],
            system_instruction: Content {
                role: "system".into(),
                parts: vec![Part::Text {
                    text: "sys".into(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 8192,
                response_mime_type: "text/plain",
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: 512,
                }),
            },
            tools: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(v["generationConfig"]["topP"], 0.95);
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(v["generationConfig"]["thinkingConfig"]["thinkingBudget"], 512);
        assert!(v.get("tools").is_none());
    }

    #[test]
    fn stream_chunk_text_is_extracted_from_first_candidate() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"he"},{"text":"llo"}]}}]}"#;
        let resp: StreamGenerateResponse = serde_json::from_str(data).unwrap();
        let text: String = resp.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        assert_eq!(text, "hello");
    }
}
