//! Generator adapters: three uniform streaming backends (LOCAL, FAST, AGENT)
//! behind one interface, plus the downgrade policy the Turn Controller applies
//! between them.

pub mod agent;
pub mod fallback;
pub mod fast;
pub mod local;
pub mod sse;

pub use fallback::DowngradePolicy;

use crate::clock::CancelHandle;
use crate::error::Result;
use crate::router::Tier;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

/// One request to a generator adapter.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub utterance_id: u64,
    pub tier: Tier,
    pub prompt: String,
    pub system_prompt: String,
    pub max_output_tokens: u32,
    pub ttft_deadline_ms: u64,
    pub total_deadline_ms: u64,
}

/// One streamed token.
#[derive(Debug, Clone)]
pub struct Token {
    pub utterance_id: u64,
    pub text: String,
    pub is_final: bool,
    /// Strictly increasing per utterance.
    pub seq: u64,
}

/// Token counts and cost reported once a generation completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<Token>> + Send>>;

/// Common contract implemented by the LOCAL, FAST, and AGENT adapters.
#[async_trait]
pub trait GeneratorAdapter: Send + Sync {
    fn tier(&self) -> Tier;

    /// Start a streaming generation. The returned stream yields tokens in
    /// `seq` order; the adapter commits exactly one [`GenerationUsage`] via
    /// `usage_sink` once the stream ends (success, error, or cancellation
    /// with partial output).
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancelHandle,
    ) -> Result<(TokenStream, UsageHandle)>;
}

/// Handle the caller polls after the token stream completes to retrieve the
/// usage the adapter recorded for this request.
pub struct UsageHandle {
    receiver: tokio::sync::oneshot::Receiver<GenerationUsage>,
}

impl UsageHandle {
    pub fn new(receiver: tokio::sync::oneshot::Receiver<GenerationUsage>) -> Self {
        Self { receiver }
    }

    pub async fn usage(self) -> Result<GenerationUsage> {
        self.receiver
            .await
            .map_err(|_| crate::error::AtlasError::Generator("usage channel dropped".into()))
    }
}

/// Estimate token count from text when a backend does not report one:
/// roughly 4 UTF-8 bytes per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64 / 4).max(1)
}
