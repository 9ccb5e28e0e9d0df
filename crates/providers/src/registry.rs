//! Provider registry: bracket-tag → endpoint profile resolution.
//!
//! Model identifiers may carry a bracketed provider tag, e.g.
//! `"[Groq] llama-3.1-70b-versatile"`. Resolution strips the tag (tag plus
//! exactly one following space) and returns the matching profile. Anything
//! unrecognized falls back to the default profile with the input unchanged —
//! a deliberate UX choice: misconfigured tags degrade to default credentials
//! instead of failing.

use shared::settings::AppSettings;
use std::env;

#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Bracket label without the brackets; empty for the default profile.
    pub tag: String,
    pub base_url: String,
    pub api_key: String,
    pub allow_system_with_images: bool,
}

/// Static per-model request tweaks, keyed on the bare model name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelQuirks {
    /// Cerebras-hosted models need an explicit output-token cap.
    pub max_completion_tokens: Option<u32>,
}

pub fn quirks_for(bare_model: &str) -> ModelQuirks {
    if bare_model.starts_with("cerebras") {
        return ModelQuirks {
            max_completion_tokens: Some(8192),
        };
    }
    ModelQuirks::default()
}

pub struct ProviderRegistry {
    profiles: Vec<ProviderProfile>,
    default_profile: ProviderProfile,
}

impl ProviderRegistry {
    /// Build the registry once from settings. Empty API keys fall back to the
    /// `<TAG>_API_KEY` environment variable, so keys never have to live in
    /// the settings file.
    pub fn from_settings(settings: &AppSettings) -> Self {
        let profiles = settings
            .endpoints
            .iter()
            .map(|ep| ProviderProfile {
                tag: ep.tag.clone(),
                base_url: ep.base_url.clone(),
                api_key: resolve_key(&ep.api_key, &ep.tag),
                allow_system_with_images: ep.allow_system_with_images,
            })
            .collect();

        let default_profile = ProviderProfile {
            tag: String::new(),
            base_url: settings.default_base_url.clone(),
            api_key: resolve_key(&settings.default_api_key, "OPENAI"),
            allow_system_with_images: false,
        };

        Self {
            profiles,
            default_profile,
        }
    }

    /// Resolve a possibly-tagged model string to a profile and the bare
    /// wire-level model name. Never fails.
    pub fn resolve<'a>(&'a self, model: &str) -> (&'a ProviderProfile, String) {
        for profile in &self.profiles {
            let prefix = format!("[{}] ", profile.tag);
            if let Some(bare) = model.strip_prefix(&prefix) {
                return (profile, bare.to_string());
            }
        }
        tracing::debug!(model, "no provider tag matched, using default profile");
        (&self.default_profile, model.to_string())
    }

    pub fn default_profile(&self) -> &ProviderProfile {
        &self.default_profile
    }
}

fn resolve_key(configured: &str, tag: &str) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }
    env::var(format!("{}_API_KEY", tag.to_uppercase())).unwrap_or_default()
}
