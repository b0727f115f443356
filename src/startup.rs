//! Startup wiring: loads configuration, resolves model handles, and
//! constructs every pipeline component with the bounded channels between
//! them that the concurrency model calls for.
//!
//! Mirrors the phased download-then-load startup idiom used elsewhere in
//! this codebase, adapted for resources that are constructed in-process
//! rather than downloaded: config and prototypes are loaded first, then
//! each stateful component (ledger, router, generators, synthesizer) is
//! built in dependency order with a status line per step.

use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::filler::FillerPlayer;
use crate::generator::agent::AgentAdapter;
use crate::generator::fast::RemoteAdapter;
use crate::generator::local::LocalAdapter;
use crate::ledger::CostLedger;
use crate::models::ModelHandles;
use crate::router::{Prototype, Router, Tier};
use crate::stt::{EchoBackend, StreamingTranscriber};
use crate::synth::{StreamingSynthesizer, ToneSynthesisBackend};
use crate::turn::{GeneratorTable, TurnController};
use crate::vad::VoiceActivityDetector;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Every long-lived component the frame-ingestion loop needs, wired and
/// ready to accept audio.
pub struct Pipeline {
    pub config: AtlasConfig,
    pub models: ModelHandles,
    pub vad: VoiceActivityDetector,
    pub transcriber: StreamingTranscriber,
    pub turn_controller: Arc<TurnController>,
}

/// Build the full pipeline from a loaded configuration.
///
/// # Errors
///
/// Returns an error if model resolution, ledger persistence, or prototype
/// loading fails.
pub async fn build_pipeline(config: AtlasConfig) -> Result<Pipeline> {
    config.validate()?;

    info!("resolving model handles");
    let models = ModelHandles::resolve(&config)?;

    info!("opening cost ledger at {}", config.ledger.db_path.display());
    let start = Instant::now();
    let ledger = Arc::new(CostLedger::open(&config.ledger.db_path, config.budget.clone())?);
    info!("ledger ready ({:.2}s)", start.elapsed().as_secs_f64());

    let prototypes = load_prototypes(&models.embedding_model_path)?;
    info!(count = prototypes.len(), "loaded router prototypes");
    let router = Arc::new(Router::new(config.router.clone(), prototypes));

    let generators = GeneratorTable {
        local: Arc::new(LocalAdapter::new()),
        fast: Arc::new(RemoteAdapter::fast(config.tiers.fast.clone())),
        agent: Arc::new(AgentAdapter::agent(config.tiers.agent.clone())),
    };

    let synthesizer = Arc::new(StreamingSynthesizer::new(
        Arc::new(ToneSynthesisBackend),
        config.synth.clone(),
        config.audio.output_sample_rate,
    ));

    let filler = Arc::new(FillerPlayer::new(config.filler.clone(), synthesizer.clone()));

    let turn_controller = Arc::new(TurnController::new(
        router,
        ledger,
        generators,
        synthesizer,
        filler,
        config.clone(),
    ));

    let vad = VoiceActivityDetector::new(&config.vad)?;
    let transcriber = StreamingTranscriber::new(config.stt.clone(), Box::new(EchoBackend::default()));

    info!("pipeline ready");

    Ok(Pipeline {
        config,
        models,
        vad,
        transcriber,
        turn_controller,
    })
}

#[derive(Debug, Deserialize)]
struct PrototypeEntry {
    tier: String,
    centroid: Vec<f32>,
}

/// Load cached prototype centroids from the path config points at. Missing
/// file is not an error — the router simply falls through to its default
/// decision for every utterance until prototypes are provisioned.
fn load_prototypes(path: &std::path::Path) -> Result<Vec<Prototype>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AtlasError::Model(format!("failed to read {}: {e}", path.display())))?;
    let entries: Vec<PrototypeEntry> = serde_json::from_str(&contents)
        .map_err(|e| AtlasError::Model(format!("failed to parse {}: {e}", path.display())))?;

    entries
        .into_iter()
        .map(|entry| {
            let tier = parse_tier(&entry.tier)?;
            Ok(Prototype {
                tier,
                centroid: entry.centroid,
            })
        })
        .collect()
}

fn parse_tier(value: &str) -> Result<Tier> {
    match value {
        "local" => Ok(Tier::Local),
        "fast" => Ok(Tier::Fast),
        "agent" => Ok(Tier::Agent),
        other => Err(AtlasError::Model(format!("unknown tier in prototypes file: {other}"))),
    }
}
