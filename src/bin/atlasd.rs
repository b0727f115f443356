//! `atlasd`: the voice routing daemon. Captures microphone audio, brackets
//! speech with the VAD, transcribes each bracket, and runs one Turn per
//! utterance through the router/generator/synthesizer pipeline.

use atlas_core::audio::capture::CpalCapture;
use atlas_core::audio::{ChannelFrameSource, Frame, FrameSource};
use atlas_core::clock::CancelHandle;
use atlas_core::observability::init_tracing;
use atlas_core::vad::VadEvent;
use atlas_core::AtlasConfig;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "atlasd", version, about = "ATLAS hybrid voice routing daemon")]
struct Cli {
    /// Path to the TOML policy file. Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AtlasConfig::from_file(path)?,
        None => AtlasConfig::load_or_default()?,
    };

    let _log_guard = init_tracing(&config.logging);
    info!("atlasd starting");

    let pipeline = atlas_core::build_pipeline(config.clone()).await?;
    let mut vad = pipeline.vad;
    let mut transcriber = pipeline.transcriber;
    let turn_controller = pipeline.turn_controller;

    let capture = CpalCapture::new(&config.audio)?;
    let (frame_tx, frame_rx) = tokio::sync::mpsc::channel::<Frame>(64);
    let capture_cancel = CancellationToken::new();
    let capture_task = {
        let capture_cancel = capture_cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = capture.run(frame_tx, capture_cancel).await {
                error!(error = %e, "audio capture failed");
            }
        })
    };
    let mut frames = ChannelFrameSource::new(frame_rx);

    let mut utterance_samples: Vec<f32> = Vec::new();
    let mut sample_rate = config.audio.input_sample_rate;
    let mut active_turn: Option<ActiveTurn> = None;

    loop {
        let frame = match frames.next_frame().await {
            Some(frame) => frame,
            None => break,
        };
        sample_rate = frame.sample_rate;

        let event = vad.on_frame(&frame);
        utterance_samples.extend_from_slice(&frame.samples);

        match event {
            Some(VadEvent::SpeechStart { .. }) => {
                // Barge-in: new speech while a turn is still speaking cancels
                // it immediately rather than waiting for it to finish, so VAD
                // keeps observing frames without a stalled playback blocking
                // the ingestion loop.
                if let Some(turn) = active_turn.take() {
                    turn.cancel.cancel();
                }
            }
            Some(VadEvent::SpeechEnd { at, .. }) => {
                let turn_cancel = CancelHandle::new();
                let samples = std::mem::take(&mut utterance_samples);

                match transcriber
                    .transcribe(&samples, sample_rate, at, &turn_cancel)
                    .await
                {
                    Ok(utterance) => {
                        if let Some(turn) = active_turn.take() {
                            turn.cancel.cancel();
                        }
                        info!(utterance_id = utterance.id, text = %utterance.text, "transcribed");
                        let mut segments =
                            turn_controller.run_turn(utterance, turn_cancel.clone());
                        let task = tokio::spawn(async move {
                            while let Some(segment) = segments.recv().await {
                                match segment {
                                    Ok(segment) => {
                                        info!(
                                            utterance_id = segment.utterance_id,
                                            seq = segment.seq,
                                            samples = segment.samples.len(),
                                            is_final = segment.is_final,
                                            "synthesized segment ready for playback"
                                        );
                                    }
                                    Err(e) => warn!(error = %e, "turn failed"),
                                }
                            }
                        });
                        active_turn = Some(ActiveTurn {
                            cancel: turn_cancel,
                            task,
                        });
                    }
                    Err(e) => warn!(error = %e, "transcription failed"),
                }
            }
            None => {}
        }
    }

    if let Some(turn) = active_turn.take() {
        turn.cancel.cancel();
        let _ = turn.task.await;
    }
    capture_cancel.cancel();
    let _ = capture_task.await;
    info!("atlasd shut down cleanly");
    Ok(())
}

/// The Turn currently being spoken, draining on its own task so frame
/// ingestion (and therefore VAD) is never blocked on playback.
struct ActiveTurn {
    cancel: CancelHandle,
    task: tokio::task::JoinHandle<()>,
}
