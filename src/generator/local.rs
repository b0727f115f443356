//! LOCAL tier: in-process small-model generator. Zero cost, tightest deadline,
//! and the final fallback rung — if LOCAL fails the Turn Controller does not
//! retry and instead speaks the fixed persona refusal phrase.

use super::{GenerationRequest, GenerationUsage, GeneratorAdapter, Token, TokenStream, UsageHandle};
use crate::clock::CancelHandle;
use crate::error::{AtlasError, Result};
use crate::router::Tier;
use async_stream::try_stream;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Minimal in-process generator. A production build swaps `respond` for a
/// real small-model forward pass; the streaming/cancellation/usage contract
/// stays the same either way.
pub struct LocalAdapter {
    responder: Box<dyn Fn(&str) -> String + Send + Sync>,
}

impl LocalAdapter {
    pub fn new() -> Self {
        Self::with_responder(Box::new(default_response))
    }

    pub fn with_responder(responder: Box<dyn Fn(&str) -> String + Send + Sync>) -> Self {
        Self { responder }
    }
}

impl Default for LocalAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn default_response(_prompt: &str) -> String {
    "Done.".into()
}

#[async_trait]
impl GeneratorAdapter for LocalAdapter {
    fn tier(&self) -> Tier {
        Tier::Local
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancelHandle,
    ) -> Result<(TokenStream, UsageHandle)> {
        let text = (self.responder)(&request.prompt);
        let utterance_id = request.utterance_id;

        info!(utterance_id, "local generator responding");

        let (usage_tx, usage_rx) = tokio::sync::oneshot::channel();

        let words: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
        let word_count = words.len() as u64;
        let ttft_deadline = Duration::from_millis(request.ttft_deadline_ms);
        let total_deadline = Duration::from_millis(request.total_deadline_ms);

        let stream = try_stream! {
            let start = tokio::time::Instant::now();
            let ttft_at = start + ttft_deadline;
            let total_at = start + total_deadline;

            for (i, word) in words.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                // The in-process responder above already ran synchronously, so
                // this never actually trips for the dependency-free default;
                // it exists so a real small-model forward pass (which would
                // stream tokens asynchronously) respects the same deadlines
                // FAST/AGENT do.
                let deadline = if i == 0 { ttft_at.min(total_at) } else { total_at };
                if tokio::time::timeout_at(deadline, tokio::task::yield_now()).await.is_err() {
                    let kind = if i == 0 { "TIMEOUT_TTFT" } else { "TIMEOUT_TOTAL" };
                    Err(AtlasError::Generator(format!(
                        "local tier {kind}: exceeded deadline producing token {i}"
                    )))?;
                }
                let is_final = i as u64 + 1 == word_count;
                yield Token {
                    utterance_id,
                    text: if is_final { word } else { format!("{word} ") },
                    is_final,
                    seq: i as u64,
                };
            }
        };

        let _ = usage_tx.send(GenerationUsage {
            input_tokens: super::estimate_tokens(&request.prompt),
            output_tokens: super::estimate_tokens(&text),
            cost_usd: 0.0,
        });

        Ok((Box::pin(stream), UsageHandle::new(usage_rx)))
    }
}
