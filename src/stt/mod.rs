//! Streaming transcriber: turns a bracketed frame span into one [`Utterance`].
//!
//! Holds at most one in-flight decode; a caller must await or cancel the
//! current transcription before starting another (enforced by `&mut self`).

use crate::clock::CancelHandle;
use crate::config::SttConfig;
use crate::error::{AtlasError, Result};
use std::time::{Duration, Instant};
use tracing::info;

/// A finalized transcript produced between a `SpeechStart`/`SpeechEnd` bracket.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Monotonic per-process identifier.
    pub id: u64,
    pub text: String,
    /// Backend-reported confidence in `[0, 1]`; 0.5 if the backend does not supply one.
    pub stt_confidence: f32,
    pub t_speech_end: Instant,
    pub t_transcript_ready: Instant,
}

/// Backend that turns raw PCM samples into text. A production implementation
/// wraps a local ASR model; [`EchoBackend`] is used in tests.
pub trait TranscriptionBackend: Send {
    fn decode(&mut self, samples: &[f32], sample_rate: u32) -> Result<(String, Option<f32>)>;
}

/// Transcribes one speech bracket at a time.
pub struct StreamingTranscriber {
    backend: Box<dyn TranscriptionBackend>,
    config: SttConfig,
    next_id: u64,
    busy: bool,
}

impl StreamingTranscriber {
    pub fn new(config: SttConfig, backend: Box<dyn TranscriptionBackend>) -> Self {
        Self {
            backend,
            config,
            next_id: 1,
            busy: false,
        }
    }

    /// Transcribe a bracketed speech segment, padding the head and tail to
    /// mitigate boundary truncation (padding does not count toward reported
    /// duration).
    pub async fn transcribe(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        t_speech_end: Instant,
        cancel: &CancelHandle,
    ) -> Result<Utterance> {
        if self.busy {
            return Err(AtlasError::Stt(
                "transcriber already has an in-flight decode".into(),
            ));
        }
        self.busy = true;
        let result = self
            .transcribe_inner(samples, sample_rate, t_speech_end, cancel)
            .await;
        self.busy = false;
        result
    }

    async fn transcribe_inner(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        t_speech_end: Instant,
        cancel: &CancelHandle,
    ) -> Result<Utterance> {
        if samples.is_empty() {
            return Err(AtlasError::Stt("EMPTY".into()));
        }

        let padded = pad_samples(samples, sample_rate, &self.config);
        let deadline = Duration::from_millis(self.config.deadline_ms);

        let decode = async {
            self.backend.decode(&padded, sample_rate)
        };

        let (text, confidence) = crate::clock::race(
            decode,
            deadline,
            cancel,
            || AtlasError::Stt("TIMEOUT".into()),
            || AtlasError::Stt("cancelled".into()),
        )
        .await??;

        if text.trim().is_empty() {
            return Err(AtlasError::Stt("EMPTY".into()));
        }

        let id = self.next_id;
        self.next_id += 1;
        let t_transcript_ready = Instant::now();

        info!(
            utterance_id = id,
            confidence = confidence.unwrap_or(0.5),
            "transcribed utterance"
        );

        Ok(Utterance {
            id,
            text,
            stt_confidence: confidence.unwrap_or(0.5),
            t_speech_end,
            t_transcript_ready,
        })
    }
}

fn pad_samples(samples: &[f32], sample_rate: u32, config: &SttConfig) -> Vec<f32> {
    let head = (sample_rate as u64 * config.head_pad_ms as u64 / 1000) as usize;
    let tail = (sample_rate as u64 * config.tail_pad_ms as u64 / 1000) as usize;
    let mut padded = Vec::with_capacity(head + samples.len() + tail);
    padded.extend(std::iter::repeat(0.0).take(head));
    padded.extend_from_slice(samples);
    padded.extend(std::iter::repeat(0.0).take(tail));
    padded
}

/// Test/demo backend that returns a fixed transcript regardless of audio content.
#[derive(Default)]
pub struct EchoBackend {
    pub fixed_text: String,
}

impl TranscriptionBackend for EchoBackend {
    fn decode(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<(String, Option<f32>)> {
        Ok((self.fixed_text.clone(), Some(0.9)))
    }
}
