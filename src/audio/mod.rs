//! Audio frame types shared by the capture source, VAD, and playback sink.

pub mod capture;

use std::time::Instant;

/// A fixed-length PCM16 frame produced by the external capture handle.
///
/// Immutable once produced; consumed exactly once by the VAD (and, within an
/// open speech bracket, by the transcriber).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Interleaved mono f32 samples at `sample_rate`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Monotonic capture timestamp.
    pub captured_at: Instant,
}

impl Frame {
    /// Construct a frame captured at the current instant.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            captured_at: Instant::now(),
        }
    }

    /// Frame duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        1000.0 * self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A contiguous span of audio synthesized for one utterance.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub utterance_id: u64,
    /// Strictly increasing per utterance.
    pub seq: u64,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
    pub is_final: bool,
}

/// Source of audio frames, abstracting over the capture transport.
///
/// Implementations yield frames in monotonic timestamp order and signal EOF
/// by returning `None`.
pub trait FrameSource: Send {
    /// Block (async) until the next frame is available, or return `None` at EOF.
    fn next_frame(&mut self) -> impl std::future::Future<Output = Option<Frame>> + Send;
}

/// Adapts a bounded `tokio::sync::mpsc` channel (e.g. fed by
/// [`capture::CpalCapture::run`]) into a [`FrameSource`].
pub struct ChannelFrameSource {
    receiver: tokio::sync::mpsc::Receiver<Frame>,
}

impl ChannelFrameSource {
    pub fn new(receiver: tokio::sync::mpsc::Receiver<Frame>) -> Self {
        Self { receiver }
    }
}

impl FrameSource for ChannelFrameSource {
    async fn next_frame(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }
}
