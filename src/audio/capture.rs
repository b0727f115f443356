//! Microphone audio capture using cpal.
//!
//! Captures audio at the device's native sample rate, downmixes to mono, and
//! resamples in software to the configured input rate before handing fixed-
//! size [`Frame`]s to the pipeline over a bounded channel.

use super::Frame;
use crate::config::AudioConfig;
use crate::error::{AtlasError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Audio capture from the system microphone via cpal.
pub struct CpalCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_sample_rate: u32,
    frame_len: usize,
}

impl CpalCapture {
    /// Open the default input device at its native configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no default input device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AtlasError::Audio("no default input device".into()))?;

        let default_config = device
            .default_input_config()
            .map_err(|e| AtlasError::Audio(format!("no default input config: {e}")))?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let frame_len =
            (config.input_sample_rate as u64 * config.frame_duration_ms as u64 / 1000) as usize;

        info!(
            native_rate = stream_config.sample_rate.0,
            channels = stream_config.channels,
            target_rate = config.input_sample_rate,
            "opened input device"
        );

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.input_sample_rate,
            frame_len: frame_len.max(1),
        })
    }

    /// Run the capture stream, emitting fixed-length frames to `tx` until
    /// `cancel` fires. The audio callback never blocks: a full channel drops
    /// the frame and counts it.
    pub async fn run(&self, tx: mpsc::Sender<Frame>, cancel: CancellationToken) -> Result<()> {
        let native_rate = self.stream_config.sample_rate.0;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;
        let frame_len = self.frame_len;
        let dropped = AtomicU64::new(0);
        let mut pending: VecDeque<f32> = VecDeque::with_capacity(frame_len * 4);

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = to_mono(data, native_channels);
                    let resampled = resample_nearest(&mono, native_rate, target_rate);
                    pending.extend(resampled);

                    while pending.len() >= frame_len {
                        let samples: Vec<f32> = pending.drain(..frame_len).collect();
                        let frame = Frame::new(samples, target_rate);
                        if tx.try_send(frame).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                },
                move |err| error!("audio input stream error: {err}"),
                None,
            )
            .map_err(|e| AtlasError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| AtlasError::Audio(format!("failed to start input stream: {e}")))?;

        cancel.cancelled().await;
        debug!("audio capture stopped");
        drop(stream);
        Ok(())
    }
}

fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let channels = channels as usize;
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Nearest-neighbor resampling. Adequate for voice-band audio; a production
/// build would use a proper sinc resampler.
fn resample_nearest(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = (samples.len() as f64 * ratio).round() as usize;
    (0..out_len)
        .map(|i| {
            let src_idx = ((i as f64) / ratio).round() as usize;
            samples[src_idx.min(samples.len() - 1)]
        })
        .collect()
}
