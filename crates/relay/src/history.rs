//! Dialogue history: a capped, ordered log of completed exchanges.
//!
//! Mutated only after a completed (non-error, non-cancelled) exchange, and
//! never while a request is in flight — the worker is joined first, so no
//! locking is needed.

use shared::chat::{ChatMessage, Role};

/// How many characters of each dropped turn survive into the synthetic
/// summary entry. A type-preserving placeholder, not a real summarizer.
const SUMMARY_SNIPPET_CHARS: usize = 100;

#[derive(Debug)]
pub struct DialogueHistory {
    entries: Vec<ChatMessage>,
    max_entries: usize,
    summarize: bool,
}

impl DialogueHistory {
    pub fn new(max_entries: usize, summarize: bool) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
            summarize,
        }
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record a completed exchange: the user turn (original prompt text, not
    /// the auxiliary-augmented one) followed by the assistant turn.
    pub fn record_exchange(&mut self, prompt: &str, response: &str) {
        self.entries.push(ChatMessage::text(Role::User, prompt));
        self.entries.push(ChatMessage::text(Role::Assistant, response));
        self.enforce_cap();
    }

    fn enforce_cap(&mut self) {
        if self.max_entries == 0 || self.entries.len() <= self.max_entries {
            return;
        }
        if self.summarize {
            self.collapse_oldest();
        } else {
            // Sliding window: drop the oldest non-system entries first.
            while self.entries.len() > self.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .position(|m| m.role != Role::System)
                    .unwrap_or(0);
                self.entries.remove(oldest);
            }
        }
    }

    /// Collapse everything but the most recent `max - 2` entries into one
    /// synthetic summary entry, preserving a leading system entry if present.
    fn collapse_oldest(&mut self) {
        let keep = self.max_entries.saturating_sub(2);
        let system = if self
            .entries
            .first()
            .map(|m| m.role == Role::System)
            .unwrap_or(false)
        {
            Some(self.entries.remove(0))
        } else {
            None
        };

        if self.entries.len() <= keep {
            if let Some(system) = system {
                self.entries.insert(0, system);
            }
            return;
        }

        let recent = self.entries.split_off(self.entries.len() - keep);
        let snippets: Vec<String> = self
            .entries
            .iter()
            .map(|m| {
                let text: String = m.content.text().chars().take(SUMMARY_SNIPPET_CHARS).collect();
                format!("{}: {}", m.role.as_str(), text)
            })
            .collect();
        let summary = ChatMessage::text(
            Role::System,
            format!("Summary of earlier conversation:\n{}", snippets.join("\n")),
        );

        self.entries = Vec::with_capacity(keep + 2);
        if let Some(system) = system {
            self.entries.push(system);
        }
        self.entries.push(summary);
        self.entries.extend(recent);
    }
}
