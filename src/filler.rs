//! Filler player: speaks a short neutral phrase while a non-LOCAL tier is
//! still generating, so the user hears something within the first turn
//! deadline even when the real answer hasn't arrived yet.
//!
//! Runs on its own [`CancelHandle`], independent of the generation/synthesis
//! cancel handle for the real answer, so the Turn Controller can cut the
//! filler short the instant the first real segment is ready without
//! disturbing the in-flight generation. Filler playback never produces a
//! [`UsageRecord`](crate::ledger::UsageRecord) — it costs nothing and isn't
//! billed.

use crate::audio::AudioSegment;
use crate::clock::CancelHandle;
use crate::config::FillerConfig;
use crate::error::Result;
use crate::synth::StreamingSynthesizer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Picks phrases from the configured pool in rotation. Deterministic instead
/// of random so behavior is reproducible in tests and logs.
pub struct FillerPlayer {
    config: FillerConfig,
    synthesizer: Arc<StreamingSynthesizer>,
    next_phrase: AtomicUsize,
}

impl FillerPlayer {
    pub fn new(config: FillerConfig, synthesizer: Arc<StreamingSynthesizer>) -> Self {
        Self {
            config,
            synthesizer,
            next_phrase: AtomicUsize::new(0),
        }
    }

    /// Select the next filler phrase without advancing state, for callers
    /// that only want to know what would be said.
    pub fn peek_phrase(&self) -> &str {
        if self.config.phrases.is_empty() {
            return "";
        }
        let idx = self.next_phrase.load(Ordering::Relaxed) % self.config.phrases.len();
        &self.config.phrases[idx]
    }

    /// Synthesize one filler phrase as a single final `AudioSegment`.
    ///
    /// Returns `None` if the phrase pool is empty (a misconfigured policy) or
    /// if `cancel` is already cancelled before synthesis starts — the most
    /// common case being the real answer's first segment having already
    /// arrived.
    pub async fn play(
        &self,
        utterance_id: u64,
        sample_rate: u32,
        cancel: &CancelHandle,
    ) -> Result<Option<AudioSegment>> {
        if self.config.phrases.is_empty() || cancel.is_cancelled() {
            return Ok(None);
        }

        let idx = self.next_phrase.fetch_add(1, Ordering::Relaxed) % self.config.phrases.len();
        let phrase = self.config.phrases[idx].clone();
        info!(utterance_id, phrase = %phrase, "playing filler");

        let samples = self
            .synthesizer
            .synthesize_one(&phrase, sample_rate)
            .await?;

        if cancel.is_cancelled() {
            return Ok(None);
        }

        Ok(Some(AudioSegment {
            utterance_id,
            seq: 0,
            sample_rate,
            samples,
            is_final: true,
        }))
    }
}
