//! Voice activity detection with hysteresis bracketing.
//!
//! Unlike a raw energy gate, the detector requires a speech probability to
//! stay above `threshold` continuously for `min_speech_ms` before emitting
//! [`VadEvent::SpeechStart`], and below it continuously for `min_silence_ms`
//! before emitting [`VadEvent::SpeechEnd`]. Both edges are padded by
//! `speech_pad_ms` to avoid clipping the first and last phoneme.

use crate::audio::Frame;
use crate::config::VadConfig;
use crate::error::Result;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{info, warn};

/// A speech boundary event emitted by the detector.
///
/// Events alternate strictly: the first event after the detector is created
/// (or reset) is always `SpeechStart`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VadEvent {
    SpeechStart { at: Instant },
    SpeechEnd { at: Instant, duration_ms: u64 },
}

/// Speech-probability backend. A real implementation wraps a detector model;
/// tests and the default construction use [`EnergyProbability`].
pub trait SpeechProbability: Send {
    /// Return a speech probability in `[0, 1]` for this frame.
    fn probability(&mut self, frame: &Frame) -> f32;
}

/// Fallback probability backend: normalized RMS energy clamped to `[0, 1]`.
///
/// Used when no dedicated speech-probability model is configured; cheap and
/// dependency-free, at the cost of being less robust to background noise
/// than a trained detector.
#[derive(Debug, Default)]
pub struct EnergyProbability {
    /// Empirical ceiling RMS value mapped to a probability of 1.0.
    ceiling: f32,
}

impl EnergyProbability {
    pub fn new() -> Self {
        Self { ceiling: 0.2 }
    }
}

impl SpeechProbability for EnergyProbability {
    fn probability(&mut self, frame: &Frame) -> f32 {
        if frame.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = frame.samples.iter().map(|s| s * s).sum();
        let rms = (sum_sq / frame.samples.len() as f32).sqrt();
        (rms / self.ceiling).clamp(0.0, 1.0)
    }
}

/// Hysteresis-bracketing voice activity detector.
pub struct VoiceActivityDetector {
    backend: Box<dyn SpeechProbability>,
    threshold: f32,
    min_speech_ms: u32,
    min_silence_ms: u32,
    speech_pad_ms: u32,

    in_speech: bool,
    /// Accumulated ms of continuous above-threshold frames while not yet in speech.
    candidate_speech_ms: u32,
    /// Accumulated ms of continuous below-threshold frames while in speech.
    candidate_silence_ms: u32,
    speech_started_at: Option<Instant>,
    /// Pre-roll buffer covering `speech_pad_ms`, used to backdate `SpeechStart`.
    pre_roll: VecDeque<Instant>,
}

impl VoiceActivityDetector {
    pub fn new(config: &VadConfig) -> Result<Self> {
        Self::with_backend(config, Box::new(EnergyProbability::new()))
    }

    pub fn with_backend(config: &VadConfig, backend: Box<dyn SpeechProbability>) -> Result<Self> {
        info!(
            threshold = config.threshold,
            min_speech_ms = config.min_speech_ms,
            min_silence_ms = config.min_silence_ms,
            speech_pad_ms = config.speech_pad_ms,
            "voice activity detector initialized"
        );
        Ok(Self {
            backend,
            threshold: config.threshold,
            min_speech_ms: config.min_speech_ms,
            min_silence_ms: config.min_silence_ms,
            speech_pad_ms: config.speech_pad_ms,
            in_speech: false,
            candidate_speech_ms: 0,
            candidate_silence_ms: 0,
            speech_started_at: None,
            pre_roll: VecDeque::new(),
        })
    }

    /// Process one frame, returning an event if a bracket edge just fired.
    pub fn on_frame(&mut self, frame: &Frame) -> Option<VadEvent> {
        let probability = self.backend.probability(frame);
        let frame_ms = frame.duration_ms() as u32;
        let is_speech = probability >= self.threshold;

        if !self.in_speech {
            self.pre_roll.push_back(frame.captured_at);
            while self.pre_roll_span_ms() > self.speech_pad_ms {
                self.pre_roll.pop_front();
            }

            if is_speech {
                self.candidate_speech_ms = self.candidate_speech_ms.saturating_add(frame_ms);
                if self.candidate_speech_ms >= self.min_speech_ms {
                    self.in_speech = true;
                    self.candidate_speech_ms = 0;
                    self.candidate_silence_ms = 0;
                    let at = self.pre_roll.front().copied().unwrap_or(frame.captured_at);
                    self.speech_started_at = Some(at);
                    return Some(VadEvent::SpeechStart { at });
                }
            } else {
                self.candidate_speech_ms = 0;
            }
            None
        } else {
            if is_speech {
                self.candidate_silence_ms = 0;
            } else {
                self.candidate_silence_ms = self.candidate_silence_ms.saturating_add(frame_ms);
                if self.candidate_silence_ms >= self.min_silence_ms {
                    self.in_speech = false;
                    self.candidate_speech_ms = 0;
                    self.candidate_silence_ms = 0;
                    let started_at = self.speech_started_at.take().unwrap_or(frame.captured_at);
                    let duration_ms = frame
                        .captured_at
                        .duration_since(started_at)
                        .as_millis()
                        .saturating_add(self.speech_pad_ms as u128)
                        as u64;
                    return Some(VadEvent::SpeechEnd {
                        at: frame.captured_at,
                        duration_ms,
                    });
                }
            }
            None
        }
    }

    /// Close out any open bracket at stream EOF.
    pub fn on_eof(&mut self, at: Instant) -> Option<VadEvent> {
        if self.in_speech {
            self.in_speech = false;
            let started_at = self.speech_started_at.take().unwrap_or(at);
            let duration_ms = at.duration_since(started_at).as_millis() as u64;
            Some(VadEvent::SpeechEnd { at, duration_ms })
        } else {
            None
        }
    }

    /// Reset all hysteresis state. Used after an internal inconsistency
    /// (e.g. two consecutive `SpeechStart`s, which the bracket invariant
    /// forbids) is observed upstream.
    pub fn reset(&mut self) {
        warn!("voice activity detector reset");
        self.in_speech = false;
        self.candidate_speech_ms = 0;
        self.candidate_silence_ms = 0;
        self.speech_started_at = None;
        self.pre_roll.clear();
    }

    fn pre_roll_span_ms(&self) -> u32 {
        match (self.pre_roll.front(), self.pre_roll.back()) {
            (Some(first), Some(last)) => last.duration_since(*first).as_millis() as u32,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbability(f32);
    impl SpeechProbability for FixedProbability {
        fn probability(&mut self, _frame: &Frame) -> f32 {
            self.0
        }
    }

    fn frame(ms: u32) -> Frame {
        let sample_rate = 16_000u32;
        let n = (sample_rate * ms / 1000) as usize;
        Frame::new(vec![0.0; n.max(1)], sample_rate)
    }

    fn config() -> VadConfig {
        VadConfig {
            min_speech_ms: 50,
            min_silence_ms: 50,
            speech_pad_ms: 0,
            threshold: 0.5,
        }
    }

    #[test]
    fn short_speech_below_min_duration_does_not_start() {
        let mut vad =
            VoiceActivityDetector::with_backend(&config(), Box::new(FixedProbability(0.9)))
                .unwrap();
        let event = vad.on_frame(&frame(20));
        assert!(event.is_none());
    }

    #[test]
    fn sustained_speech_emits_start_once() {
        let mut vad =
            VoiceActivityDetector::with_backend(&config(), Box::new(FixedProbability(0.9)))
                .unwrap();
        assert!(vad.on_frame(&frame(20)).is_none());
        let event = vad.on_frame(&frame(40));
        assert!(matches!(event, Some(VadEvent::SpeechStart { .. })));
    }

    #[test]
    fn sustained_silence_after_speech_emits_end() {
        let cfg = config();
        let mut vad = VoiceActivityDetector::with_backend(
            &cfg,
            Box::new(FixedProbability(0.9)),
        )
        .unwrap();
        assert!(vad.on_frame(&frame(60)).is_some());

        // switch backend behavior by constructing a detector that starts in
        // speech, then manually mark silence frames via a mutable probability
        let mut vad = vad;
        vad.backend = Box::new(FixedProbability(0.1));
        assert!(vad.on_frame(&frame(20)).is_none());
        let event = vad.on_frame(&frame(40));
        assert!(matches!(event, Some(VadEvent::SpeechEnd { .. })));
    }

    #[test]
    fn events_alternate_strictly() {
        let mut vad =
            VoiceActivityDetector::with_backend(&config(), Box::new(FixedProbability(0.9)))
                .unwrap();
        let start = vad.on_frame(&frame(60));
        assert!(matches!(start, Some(VadEvent::SpeechStart { .. })));
        // While still speaking, no further start fires.
        assert!(vad.on_frame(&frame(10)).is_none());
    }

    #[test]
    fn eof_closes_open_bracket() {
        let mut vad =
            VoiceActivityDetector::with_backend(&config(), Box::new(FixedProbability(0.9)))
                .unwrap();
        assert!(vad.on_frame(&frame(60)).is_some());
        let event = vad.on_eof(Instant::now());
        assert!(matches!(event, Some(VadEvent::SpeechEnd { .. })));
    }

    #[test]
    fn reset_clears_in_speech_state() {
        let mut vad =
            VoiceActivityDetector::with_backend(&config(), Box::new(FixedProbability(0.9)))
                .unwrap();
        assert!(vad.on_frame(&frame(60)).is_some());
        vad.reset();
        assert!(!vad.in_speech);
    }

    #[test]
    fn energy_probability_clamps_to_unit_interval() {
        let mut backend = EnergyProbability::new();
        let silent = Frame::new(vec![0.0; 320], 16_000);
        assert_eq!(backend.probability(&silent), 0.0);

        let loud = Frame::new(vec![1.0; 320], 16_000);
        assert!(backend.probability(&loud) <= 1.0);
    }
}
