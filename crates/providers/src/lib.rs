//! Provider dispatch for streaming chat completions.
//!
//! The registry resolves a bracket-tagged model string to an endpoint
//! profile; [`producer_for`] turns a [`StreamRequest`] into the matching
//! adapter behind the uniform [`StreamProducer`] interface. Adapters push
//! text deltas into a channel and poll a cancel flag between chunks.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use shared::chat::{CancelFlag, StreamChunk, StreamEnd, StreamRequest};
use shared::settings::GeminiOptions;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

pub mod gemini;
pub mod openai;
pub mod registry;
pub mod sse;

pub use registry::{ProviderProfile, ProviderRegistry};

/// Transport timeout bounds connection setup and header exchange; a healthy
/// stream is interrupted only via the cancel flag.
pub(crate) static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Uniform delta producer over provider-specific streaming calls.
///
/// One producer issues exactly one network call; the sequence is finite and
/// not restartable. Transport or provider failures surface as `Err`; a
/// cooperative stop surfaces as `Ok(StreamEnd::Cancelled)`.
#[async_trait]
pub trait StreamProducer: Send + Sync {
    async fn stream(
        &self,
        cancel: &CancelFlag,
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<StreamEnd>;
}

/// Resolve the request's model through the registry and build the matching
/// adapter. Models under the `Gemini` tag use the native Gemini API; every
/// other profile speaks the OpenAI-compatible wire format.
pub fn producer_for(
    request: &StreamRequest,
    registry: &ProviderRegistry,
    gemini_options: &GeminiOptions,
) -> Box<dyn StreamProducer> {
    let (profile, bare_model) = registry.resolve(&request.model);
    if profile.tag == "Gemini" {
        Box::new(gemini::GeminiClient::new(
            profile.api_key.clone(),
            bare_model,
            request,
            gemini_options.clone(),
        ))
    } else {
        Box::new(openai::OpenAIClient::new(profile, bare_model, request))
    }
}
