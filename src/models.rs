//! Opaque handles to the resources loaded once at startup and shared
//! read-only for the lifetime of the process: the STT model, the router's
//! embedding model, the local generator's weights, and the synthesizer voice.

use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Pre-loaded, read-only model resources shared across every Turn.
///
/// Cloning is cheap: every field is behind an `Arc` or is itself a small
/// value copied from config.
#[derive(Clone)]
pub struct ModelHandles {
    pub stt_model_path: Arc<PathBuf>,
    pub embedding_model_path: Arc<PathBuf>,
    pub local_generator_path: Arc<PathBuf>,
    pub synth_voice: Arc<str>,
}

impl ModelHandles {
    /// Resolve model handles from configuration, verifying the paths this
    /// process needs exist before the pipeline starts accepting audio.
    ///
    /// Resolution does not load model weights into memory; the STT,
    /// router, and generator modules do that lazily on first use.
    pub fn resolve(config: &AtlasConfig) -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| AtlasError::Model("could not determine cache directory".into()))?
            .join("atlas");

        let stt_model_path = cache_dir.join(&config.stt.model);
        let embedding_model_path = config.router.prototypes.clone();
        let local_generator_path = cache_dir.join(&config.tiers.local.model);

        info!(
            stt_model = %stt_model_path.display(),
            prototypes = %embedding_model_path.display(),
            local_model = %local_generator_path.display(),
            "resolved model handles"
        );

        Ok(Self {
            stt_model_path: Arc::new(stt_model_path),
            embedding_model_path: Arc::new(embedding_model_path),
            local_generator_path: Arc::new(local_generator_path),
            synth_voice: Arc::from(config.synth.voice.as_str()),
        })
    }
}
