//! Application settings: provider endpoints, model defaults, dialogue options.
//!
//! Constructed once at startup and passed by reference into the registry and
//! request builder. Nothing here is global or mutated by a running request;
//! toggles changed mid-stream apply to the next request only.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_history() -> usize {
    20
}

/// One OpenAI-compatible endpoint reachable through a bracket tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// Bracket label without the brackets, e.g. "Groq".
    pub tag: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Whether this provider accepts a system message next to image parts.
    /// Off by default; some backends reject the combination.
    #[serde(default)]
    pub allow_system_with_images: bool,
}

impl ProviderEndpoint {
    pub fn new(tag: &str, base_url: &str) -> Self {
        Self {
            tag: tag.to_string(),
            base_url: base_url.to_string(),
            api_key: String::new(),
            allow_system_with_images: false,
        }
    }
}

/// Gemini-only request options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiOptions {
    /// Prepend the search instruction and attach the google_search tool.
    #[serde(default)]
    pub enable_search: bool,
    /// Reasoning token allocation, 0-24576. Only honored for the one model
    /// that supports it (see the Gemini adapter).
    #[serde(default)]
    pub thinking_budget: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Folder polled for the newest transcript file.
    pub transcript_dir: String,
    /// Possibly bracket-tagged model identifier.
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Static instructional prefix prepended to every prompt.
    #[serde(default)]
    pub fixed_prefix: String,
    #[serde(default = "default_true")]
    pub use_fixed_prefix: bool,
    /// Include the transcript body in the prompt at all.
    #[serde(default = "default_true")]
    pub use_transcript: bool,
    /// Send only transcript content appended since the last read.
    #[serde(default)]
    pub incremental_transcript: bool,

    /// Continuous dialogue: carry prior turns with each request.
    #[serde(default)]
    pub continuous_dialogue: bool,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Collapse dropped turns into a synthetic summary entry instead of
    /// discarding them outright.
    #[serde(default)]
    pub summarize_on_truncate: bool,

    /// Auxiliary-mode instruction appended to the prompt before dispatch.
    /// Empty means none.
    #[serde(default)]
    pub auxiliary_prompt: String,

    pub endpoints: Vec<ProviderEndpoint>,
    /// Fallback endpoint for untagged model names.
    pub default_base_url: String,
    #[serde(default)]
    pub default_api_key: String,

    #[serde(default)]
    pub gemini: GeminiOptions,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            transcript_dir: String::new(),
            model: "[Groq] llama-3.1-70b-versatile".into(),
            temperature: 1.0,
            fixed_prefix: String::new(),
            use_fixed_prefix: true,
            use_transcript: true,
            incremental_transcript: false,
            continuous_dialogue: false,
            max_history: 20,
            summarize_on_truncate: false,
            auxiliary_prompt: String::new(),
            endpoints: vec![
                ProviderEndpoint::new("Cerebras", "https://api.cerebras.ai/v1"),
                ProviderEndpoint::new("Groq", "https://api.groq.com/openai/v1"),
                ProviderEndpoint::new(
                    "Gemini",
                    "https://generativelanguage.googleapis.com/v1beta/openai/",
                ),
                ProviderEndpoint::new("SambaNova", "https://api.sambanova.ai/v1"),
                ProviderEndpoint::new("LMstudio", "http://localhost:1234/v1"),
            ],
            default_base_url: "https://api.openai.com/v1".into(),
            default_api_key: String::new(),
            gemini: GeminiOptions::default(),
        }
    }
}
