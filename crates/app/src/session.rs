//! Console session: assembles prompts from the transcript folder, runs the
//! stream worker, and records completed exchanges.

use anyhow::{anyhow, Context, Result};
use providers::{producer_for, ProviderRegistry};
use relay::history::DialogueHistory;
use relay::prompt::{self, PromptParts};
use relay::transcript::{self, TranscriptCursor};
use relay::worker::{EventSink, StreamWorker, WorkerOutcome};
use shared::chat::StreamRequest;
use shared::settings::AppSettings;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prints deltas to stdout as they arrive and a status line at the end.
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn on_delta(&self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    fn on_complete(&self, _full_text: &str) {
        println!();
    }

    fn on_error(&self, message: &str) {
        eprintln!("\nerror: {}", message);
    }

    fn on_cancelled(&self) {
        println!("\n[cancelled]");
    }
}

pub struct Session {
    settings: AppSettings,
    registry: ProviderRegistry,
    history: DialogueHistory,
    cursor: TranscriptCursor,
}

impl Session {
    pub fn new(settings: AppSettings) -> Self {
        let registry = ProviderRegistry::from_settings(&settings);
        let history =
            DialogueHistory::new(settings.max_history, settings.summarize_on_truncate);
        Self {
            settings,
            registry,
            history,
            cursor: TranscriptCursor::new(),
        }
    }

    fn latest_transcript(&self) -> Result<PathBuf> {
        let dir = Path::new(&self.settings.transcript_dir);
        transcript::latest_file(dir)
            .with_context(|| format!("cannot read transcript folder {}", dir.display()))?
            .ok_or_else(|| anyhow!("no transcript files in {}", dir.display()))
    }

    /// Assemble the five prompt segments from the current transcript state.
    /// In incremental mode only content appended since the last call is
    /// included; the cursor advances as a side effect.
    pub fn assemble_prompt(
        &mut self,
        user_prefix: &str,
        user_suffix: &str,
        ocr_text: &str,
    ) -> Result<String> {
        let transcript_body = if self.settings.use_transcript {
            let path = self.latest_transcript()?;
            if self.settings.incremental_transcript {
                let (delta, _) = self.cursor.new_content(&path)?;
                delta
            } else {
                transcript::read_transcript(&path)?
            }
        } else {
            String::new()
        };
        let parts = PromptParts {
            fixed_prefix: if self.settings.use_fixed_prefix {
                self.settings.fixed_prefix.clone()
            } else {
                String::new()
            },
            user_prefix: user_prefix.to_string(),
            transcript: transcript_body,
            user_suffix: user_suffix.to_string(),
            ocr_text: ocr_text.to_string(),
        };
        Ok(parts.assemble())
    }

    /// Build the outbound request: auxiliary suffix applied, message list
    /// constructed against the resolved provider profile and current history.
    fn build_request(&self, prompt_text: &str, image_paths: Vec<PathBuf>) -> Result<StreamRequest> {
        let final_prompt = prompt::apply_auxiliary(prompt_text, &self.settings.auxiliary_prompt);
        let use_history = self.settings.continuous_dialogue;
        let allow_system_with_images = {
            let (profile, _) = self.registry.resolve(&self.settings.model);
            profile.allow_system_with_images
        };
        let messages = prompt::build_messages(
            &final_prompt,
            &image_paths,
            self.history.entries(),
            use_history,
            allow_system_with_images,
        )?;
        Ok(StreamRequest {
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            messages,
            prompt_text: final_prompt,
            history: self.history.entries().to_vec(),
            image_paths,
            use_history,
        })
    }

    /// Spawn the stream worker without waiting, so the caller can keep
    /// handling input while the reply streams.
    pub fn start_request(
        &mut self,
        prompt_text: &str,
        image_paths: Vec<PathBuf>,
        sink: Arc<dyn EventSink>,
    ) -> Result<StreamWorker> {
        let request = self.build_request(prompt_text, image_paths)?;
        let producer = producer_for(&request, &self.registry, &self.settings.gemini);
        Ok(StreamWorker::spawn(producer, sink))
    }

    /// Record the exchange after a completed run. Cancelled and errored runs
    /// leave the history untouched. `prompt_text` is the original prompt,
    /// not the auxiliary-augmented one.
    pub fn finish_request(&mut self, prompt_text: &str, outcome: &WorkerOutcome) {
        if let WorkerOutcome::Completed(full_text) = outcome {
            if self.settings.continuous_dialogue {
                self.history.record_exchange(prompt_text, full_text);
            }
        }
    }

    /// Run one request to completion, blocking this thread.
    pub fn run_request(
        &mut self,
        prompt_text: &str,
        image_paths: Vec<PathBuf>,
        sink: Arc<dyn EventSink>,
    ) -> Result<WorkerOutcome> {
        let mut worker = self.start_request(prompt_text, image_paths, sink)?;
        let outcome = worker.wait();
        self.finish_request(prompt_text, &outcome);
        Ok(outcome)
    }

    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Write the dialogue to `history/conversation_<timestamp>.txt` inside
    /// the transcript folder and return the path written.
    pub fn export_history(&self) -> Result<PathBuf> {
        let dir = Path::new(&self.settings.transcript_dir).join("history");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("conversation_{}.txt", stamp));

        let mut body = String::new();
        for entry in self.history.entries() {
            body.push_str(entry.role.as_str());
            body.push_str(": ");
            body.push_str(&entry.content.text());
            body.push_str("\n\n");
        }
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Best effort: a headless machine without a clipboard should not block
    /// the request.
    pub fn copy_to_clipboard(&self, text: &str) {
        match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.to_string())) {
            Ok(()) => tracing::debug!("prompt copied to clipboard"),
            Err(e) => tracing::warn!("clipboard unavailable: {}", e),
        }
    }
}
