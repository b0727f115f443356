//! Streaming synthesizer: turns a token stream into a sequence of
//! [`AudioSegment`]s, chunked at sentence boundaries.
//!
//! Buffers generator text until a sentence terminator or `flush_chars` is
//! reached, then hands the buffered text to a pluggable [`SynthesisBackend`]
//! and yields one segment per flush. The final token always forces a flush
//! with `is_final = true`, even if the buffer is empty.

use crate::audio::AudioSegment;
use crate::clock::CancelHandle;
use crate::config::SynthConfig;
use crate::error::{AtlasError, Result};
use crate::generator::Token;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

/// A stream of synthesized audio segments, as produced by
/// [`StreamingSynthesizer::synthesize_stream`].
pub type SegmentStream = Pin<Box<dyn Stream<Item = Result<AudioSegment>> + Send>>;

/// Voice synthesis backend, abstracting over the acoustic model.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str, sample_rate: u32) -> Result<Vec<f32>>;
}

/// Dependency-free backend for tests and local-only deployments: emits one
/// sample of fixed amplitude per character, never errors. Stands in behind
/// the [`SynthesisBackend`] seam for a real acoustic model.
#[derive(Debug, Default)]
pub struct ToneSynthesisBackend;

#[async_trait]
impl SynthesisBackend for ToneSynthesisBackend {
    async fn synthesize(&self, text: &str, _voice: &str, _sample_rate: u32) -> Result<Vec<f32>> {
        Ok(text.chars().map(|_| 0.1f32).collect())
    }
}

/// Buffers token text and decides when a chunk is ready to synthesize.
struct SentenceBuffer {
    text: String,
    terminators: Vec<char>,
    flush_chars: usize,
}

impl SentenceBuffer {
    fn new(config: &SynthConfig) -> Self {
        Self {
            text: String::new(),
            terminators: config.sentence_terminators.clone(),
            flush_chars: config.flush_chars,
        }
    }

    fn push(&mut self, chunk: &str) -> Option<String> {
        self.text.push_str(chunk);
        if self.text.chars().count() >= self.flush_chars {
            return Some(self.take());
        }
        if let Some(idx) = self
            .text
            .rfind(|c| self.terminators.contains(&c))
            .map(|byte_idx| byte_idx + 1)
        {
            let ready = self.text[..idx].to_owned();
            self.text.drain(..idx);
            return Some(ready);
        }
        None
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Streaming text-to-speech synthesizer.
pub struct StreamingSynthesizer {
    backend: Arc<dyn SynthesisBackend>,
    config: SynthConfig,
    sample_rate: u32,
}

impl StreamingSynthesizer {
    pub fn new(backend: Arc<dyn SynthesisBackend>, config: SynthConfig, sample_rate: u32) -> Self {
        Self {
            backend,
            config,
            sample_rate,
        }
    }

    /// Synthesize a single piece of text outside the token-streaming path,
    /// e.g. for the filler player. Not sentence-chunked.
    pub async fn synthesize_one(&self, text: &str, sample_rate: u32) -> Result<Vec<f32>> {
        synthesize_chunk(&*self.backend, text, &self.config.voice, sample_rate).await
    }

    /// Consume a token stream and produce an `AudioSegment` stream.
    ///
    /// On a mid-stream synthesis error, logs the failure and yields a single
    /// empty final segment so the Turn Controller always sees a terminal
    /// segment rather than a silently truncated stream.
    pub fn synthesize_stream(
        &self,
        mut tokens: Pin<Box<dyn Stream<Item = Result<Token>> + Send>>,
        cancel: CancelHandle,
    ) -> SegmentStream {
        let backend = self.backend.clone();
        let config = self.config.clone();
        let sample_rate = self.sample_rate;

        let stream = try_stream! {
            let mut buffer = SentenceBuffer::new(&config);
            let mut seq = 0u64;
            let mut utterance_id = 0u64;

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let token = match tokens.next().await {
                    Some(token) => token?,
                    None => break,
                };
                utterance_id = token.utterance_id;

                if token.is_final {
                    buffer.text.push_str(&token.text);
                    let remainder = buffer.take();
                    match synthesize_chunk(&*backend, &remainder, &config.voice, sample_rate).await {
                        Ok(samples) => {
                            yield AudioSegment {
                                utterance_id,
                                seq,
                                sample_rate,
                                samples,
                                is_final: true,
                            };
                        }
                        Err(e) => {
                            warn!(error = %e, "synthesis failed on final flush, emitting empty segment");
                            yield AudioSegment {
                                utterance_id,
                                seq,
                                sample_rate,
                                samples: Vec::new(),
                                is_final: true,
                            };
                        }
                    }
                    return;
                }

                if let Some(ready) = buffer.push(&token.text) {
                    if ready.trim().is_empty() {
                        continue;
                    }
                    match synthesize_chunk(&*backend, &ready, &config.voice, sample_rate).await {
                        Ok(samples) => {
                            yield AudioSegment {
                                utterance_id,
                                seq,
                                sample_rate,
                                samples,
                                is_final: false,
                            };
                            seq += 1;
                        }
                        Err(e) => {
                            warn!(error = %e, "synthesis failed mid-stream, emitting empty final segment");
                            yield AudioSegment {
                                utterance_id,
                                seq,
                                sample_rate,
                                samples: Vec::new(),
                                is_final: true,
                            };
                            return;
                        }
                    }
                }
            }

            if !buffer.is_empty() {
                let remainder = buffer.take();
                match synthesize_chunk(&*backend, &remainder, &config.voice, sample_rate).await {
                    Ok(samples) => {
                        yield AudioSegment {
                            utterance_id,
                            seq,
                            sample_rate,
                            samples,
                            is_final: true,
                        };
                    }
                    Err(e) => {
                        warn!(error = %e, "synthesis failed flushing cancelled stream, emitting empty final segment");
                        yield AudioSegment {
                            utterance_id,
                            seq,
                            sample_rate,
                            samples: Vec::new(),
                            is_final: true,
                        };
                    }
                }
            }
        };

        Box::pin(stream)
    }
}

async fn synthesize_chunk(
    backend: &dyn SynthesisBackend,
    text: &str,
    voice: &str,
    sample_rate: u32,
) -> Result<Vec<f32>> {
    backend
        .synthesize(text, voice, sample_rate)
        .await
        .map_err(|e| AtlasError::Synth(format!("synthesis failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn config() -> SynthConfig {
        SynthConfig {
            voice: "default".into(),
            flush_chars: 200,
            sentence_terminators: vec!['.', '!', '?', ';', '\n'],
        }
    }

    fn token(utterance_id: u64, text: &str, is_final: bool, seq: u64) -> Result<Token> {
        Ok(Token {
            utterance_id,
            text: text.into(),
            is_final,
            seq,
        })
    }

    fn token_stream(tokens: Vec<Result<Token>>) -> Pin<Box<dyn Stream<Item = Result<Token>> + Send>> {
        Box::pin(stream::iter(tokens))
    }

    #[tokio::test]
    async fn flushes_on_sentence_terminator() {
        let synth = StreamingSynthesizer::new(Arc::new(ToneSynthesisBackend), config(), 24_000);
        let tokens = token_stream(vec![
            token(1, "Hello", false, 0),
            token(1, " there.", false, 1),
            token(1, " More text", false, 2),
            token(1, "", true, 3),
        ]);

        let mut segments = synth.synthesize_stream(tokens, CancelHandle::new());
        let mut results = Vec::new();
        while let Some(segment) = segments.next().await {
            results.push(segment.unwrap());
        }

        assert!(results.len() >= 2);
        assert!(!results[0].is_final);
        assert!(results.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn forces_flush_at_char_limit() {
        let mut cfg = config();
        cfg.flush_chars = 10;
        let synth = StreamingSynthesizer::new(Arc::new(ToneSynthesisBackend), cfg, 24_000);
        let tokens = token_stream(vec![
            token(2, "no terminators here at all", false, 0),
            token(2, "", true, 1),
        ]);

        let mut segments = synth.synthesize_stream(tokens, CancelHandle::new());
        let mut count = 0;
        while let Some(segment) = segments.next().await {
            segment.unwrap();
            count += 1;
        }
        assert!(count >= 2);
    }

    #[tokio::test]
    async fn seq_strictly_increases() {
        let synth = StreamingSynthesizer::new(Arc::new(ToneSynthesisBackend), config(), 24_000);
        let tokens = token_stream(vec![
            token(3, "One.", false, 0),
            token(3, "Two.", false, 1),
            token(3, "Three.", false, 2),
            token(3, "", true, 3),
        ]);

        let mut segments = synth.synthesize_stream(tokens, CancelHandle::new());
        let mut last_seq = None;
        while let Some(segment) = segments.next().await {
            let segment = segment.unwrap();
            if let Some(prev) = last_seq {
                assert!(segment.seq > prev);
            }
            last_seq = Some(segment.seq);
        }
    }

    #[tokio::test]
    async fn final_token_flushes_remainder_even_without_terminator() {
        let synth = StreamingSynthesizer::new(Arc::new(ToneSynthesisBackend), config(), 24_000);
        let tokens = token_stream(vec![
            token(4, "no terminator yet", false, 0),
            token(4, "", true, 1),
        ]);

        let mut segments = synth.synthesize_stream(tokens, CancelHandle::new());
        let mut results = Vec::new();
        while let Some(segment) = segments.next().await {
            results.push(segment.unwrap());
        }
        assert_eq!(results.len(), 1);
        assert!(results[0].is_final);
        assert!(!results[0].samples.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_stream_early() {
        let synth = StreamingSynthesizer::new(Arc::new(ToneSynthesisBackend), config(), 24_000);
        let cancel = CancelHandle::new();
        cancel.cancel();
        let tokens = token_stream(vec![token(5, "Hello.", false, 0), token(5, "", true, 1)]);

        let mut segments = synth.synthesize_stream(tokens, cancel);
        let mut count = 0;
        while let Some(segment) = segments.next().await {
            segment.unwrap();
            count += 1;
        }
        assert_eq!(count, 0);
    }
}
