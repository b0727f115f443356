//! Configuration for the ATLAS voice routing core.
//!
//! [`AtlasConfig`] is the parsed form of the policy document described in the
//! configuration table of the core's spec: router thresholds, per-tier deadlines
//! and unit costs, budget caps, VAD hysteresis, synthesis chunking, filler phrases,
//! persona refusal text, and the ambient logging/ledger/audio settings.
//!
//! Loaded from TOML via [`AtlasConfig::from_file`]; every nested struct carries
//! `#[serde(default)]` so a partial policy file still produces a usable config.

use crate::error::{AtlasError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the voice routing core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub stt: SttConfig,
    pub router: RouterConfig,
    pub tiers: TiersConfig,
    pub budget: BudgetConfig,
    pub synth: SynthConfig,
    pub filler: FillerConfig,
    pub persona: PersonaConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            vad: VadConfig::default(),
            stt: SttConfig::default(),
            router: RouterConfig::default(),
            tiers: TiersConfig::default(),
            budget: BudgetConfig::default(),
            synth: SynthConfig::default(),
            filler: FillerConfig::default(),
            persona: PersonaConfig::default(),
            ledger: LedgerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AtlasConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// key the file omits.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AtlasError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| AtlasError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Load configuration from the default path, or return defaults if the
    /// file does not exist.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Persist this configuration to a TOML file, creating parent directories
    /// as needed.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AtlasError::Config(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| AtlasError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, toml_str)
            .map_err(|e| AtlasError::Config(format!("failed to write {}: {e}", path.display())))
    }

    /// Default config file location: `$XDG_CONFIG_HOME/atlas/policy.toml` (or
    /// platform equivalent via `dirs`).
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AtlasError::Config("could not determine config directory".into()))?;
        Ok(config_dir.join("atlas").join("policy.toml"))
    }

    /// Validate cross-field constraints that serde defaults alone cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.budget.soft_fraction <= 0.0 || self.budget.soft_fraction > 1.0 {
            return Err(AtlasError::Config(
                "budget.soft_fraction must be in (0, 1]".into(),
            ));
        }
        if self.budget.hard_fraction < self.budget.soft_fraction {
            return Err(AtlasError::Config(
                "budget.hard_fraction must be >= budget.soft_fraction".into(),
            ));
        }
        if self.vad.threshold <= 0.0 || self.vad.threshold > 1.0 {
            return Err(AtlasError::Config(
                "vad.threshold must be in (0, 1]".into(),
            ));
        }
        if self.router.thresholds.abstain <= 0.0 || self.router.thresholds.abstain > 1.0 {
            return Err(AtlasError::Config(
                "router.thresholds.abstain must be in (0, 1]".into(),
            ));
        }
        if self.synth.flush_chars == 0 {
            return Err(AtlasError::Config(
                "synth.flush_chars must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Audio frame source/sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_duration_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            frame_duration_ms: 20,
        }
    }
}

/// Voice activity detector hysteresis configuration.
///
/// Defaults model a speech-probability threshold with hysteresis, not a raw
/// RMS-energy gate: `threshold` is compared against a [0, 1] speech
/// probability emitted by the detector backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Minimum continuous duration above `threshold` before `SpeechStart` fires.
    pub min_speech_ms: u32,
    /// Minimum continuous duration below `threshold` before `SpeechEnd` fires.
    pub min_silence_ms: u32,
    /// Padding applied to both edges of a speech bracket.
    pub speech_pad_ms: u32,
    /// Speech probability threshold in `[0, 1]`.
    pub threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            min_speech_ms: 250,
            min_silence_ms: 400,
            speech_pad_ms: 100,
            threshold: 0.5,
        }
    }
}

/// Streaming transcriber configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Model identifier or path for the speech-to-text backend.
    pub model: String,
    /// Deadline for a single transcription call.
    pub deadline_ms: u64,
    /// Padding applied to the head of the captured audio before decoding.
    pub head_pad_ms: u32,
    /// Padding applied to the tail of the captured audio before decoding.
    pub tail_pad_ms: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "parakeet".into(),
            deadline_ms: 5_000,
            head_pad_ms: 100,
            tail_pad_ms: 200,
        }
    }
}

/// Router classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterThresholds {
    /// Minimum semantic similarity before a decision is marked `unknown`.
    pub abstain: f32,
    /// Margin within which the top two semantic candidates are considered tied.
    pub tie_epsilon: f32,
    /// Minimum confidence required to keep a tentative FAST decision while in THRIFTY mode.
    pub thrifty_keep_fast: f32,
}

impl Default for RouterThresholds {
    fn default() -> Self {
        Self {
            abstain: 0.35,
            tie_epsilon: 0.03,
            thrifty_keep_fast: 0.75,
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub thresholds: RouterThresholds,
    /// Path to the prototype centroid file used by the semantic stage.
    pub prototypes: PathBuf,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            thresholds: RouterThresholds::default(),
            prototypes: PathBuf::from("prototypes.json"),
        }
    }
}

/// Per-tier deadline and cost configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub ttft_deadline_ms: u64,
    pub total_deadline_ms: u64,
    /// Cost in USD per 1,000 tokens (input + output combined). Zero for LOCAL.
    pub unit_cost: f64,
    /// Base URL for the remote backend (FAST/AGENT only; unused for LOCAL).
    pub base_url: String,
    /// API key for the remote backend. Never logged; redacted on output.
    pub api_key: String,
    /// Model identifier sent in the request body.
    pub model: String,
}

impl TierConfig {
    fn local_default() -> Self {
        Self {
            ttft_deadline_ms: 500,
            total_deadline_ms: 3_000,
            unit_cost: 0.0,
            base_url: String::new(),
            api_key: String::new(),
            model: "local-small".into(),
        }
    }

    fn fast_default() -> Self {
        Self {
            ttft_deadline_ms: 1_500,
            total_deadline_ms: 6_000,
            unit_cost: 0.15,
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
        }
    }

    fn agent_default() -> Self {
        Self {
            ttft_deadline_ms: 4_000,
            total_deadline_ms: 30_000,
            unit_cost: 0.0,
            base_url: "https://api.anthropic.com/v1".into(),
            api_key: String::new(),
            model: "claude-agent".into(),
        }
    }
}

/// Collection of the three generator tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TiersConfig {
    pub local: TierConfig,
    pub fast: TierConfig,
    pub agent: TierConfig,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            local: TierConfig::local_default(),
            fast: TierConfig::fast_default(),
            agent: TierConfig::agent_default(),
        }
    }
}

/// Budget caps and period-reset policy for the cost ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub monthly_cap_usd: f64,
    pub daily_cap_usd: f64,
    /// Fraction of `monthly_cap_usd` at which mode transitions NORMAL -> THRIFTY.
    pub soft_fraction: f64,
    /// Fraction of `monthly_cap_usd` at which mode transitions to LOCAL_ONLY.
    pub hard_fraction: f64,
    /// IANA timezone name used to compute period boundaries.
    pub timezone: String,
    /// Period reset cadence: "daily" or "monthly".
    pub period_reset: String,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_cap_usd: 20.0,
            daily_cap_usd: 2.0,
            soft_fraction: 0.8,
            hard_fraction: 1.0,
            timezone: "UTC".into(),
            period_reset: "monthly".into(),
        }
    }
}

/// Streaming synthesizer chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Voice identifier for the synthesis backend.
    pub voice: String,
    /// Maximum characters buffered before a forced flush.
    pub flush_chars: usize,
    /// Characters that terminate a sentence and trigger a flush.
    pub sentence_terminators: Vec<char>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            voice: "default".into(),
            flush_chars: 200,
            sentence_terminators: vec!['.', '!', '?', ';', '\n'],
        }
    }
}

/// Filler player configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    /// Pool of neutral phrases played while waiting on a non-LOCAL tier.
    pub phrases: Vec<String>,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            phrases: vec![
                "Let me think about that.".into(),
                "One moment.".into(),
                "Give me a second.".into(),
            ],
        }
    }
}

/// Persona-level fallback text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Spoken when all tiers have failed for a turn.
    pub refusal_phrase: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            refusal_phrase: "I'm not able to answer that right now.".into(),
        }
    }
}

/// Cost ledger persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Filesystem path to the SQLite ledger database.
    pub db_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("atlas_ledger.sqlite3"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `RUST_LOG`-style filter used when the environment variable is unset.
    pub level: String,
    /// Directory for rotating file logs. Empty disables file logging.
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            log_dir: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_internally_valid() {
        let config = AtlasConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn vad_defaults_match_hysteresis_model() {
        let vad = VadConfig::default();
        assert_eq!(vad.min_speech_ms, 250);
        assert_eq!(vad.min_silence_ms, 400);
        assert_eq!(vad.speech_pad_ms, 100);
        assert!((vad.threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn router_threshold_defaults() {
        let thresholds = RouterThresholds::default();
        assert!((thresholds.abstain - 0.35).abs() < f32::EPSILON);
        assert!((thresholds.tie_epsilon - 0.03).abs() < f32::EPSILON);
        assert!((thresholds.thrifty_keep_fast - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn tier_deadline_defaults() {
        let tiers = TiersConfig::default();
        assert_eq!(tiers.local.ttft_deadline_ms, 500);
        assert_eq!(tiers.local.total_deadline_ms, 3_000);
        assert_eq!(tiers.fast.ttft_deadline_ms, 1_500);
        assert_eq!(tiers.fast.total_deadline_ms, 6_000);
        assert_eq!(tiers.agent.ttft_deadline_ms, 4_000);
        assert_eq!(tiers.agent.total_deadline_ms, 30_000);
        assert_eq!(tiers.local.unit_cost, 0.0);
    }

    #[test]
    fn budget_fraction_defaults() {
        let budget = BudgetConfig::default();
        assert_eq!(budget.soft_fraction, 0.8);
        assert_eq!(budget.hard_fraction, 1.0);
    }

    #[test]
    fn synth_defaults() {
        let synth = SynthConfig::default();
        assert_eq!(synth.flush_chars, 200);
        assert!(synth.sentence_terminators.contains(&'.'));
        assert!(synth.sentence_terminators.contains(&'\n'));
    }

    #[test]
    fn rejects_invalid_soft_fraction() {
        let mut config = AtlasConfig::default();
        config.budget.soft_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_hard_below_soft() {
        let mut config = AtlasConfig::default();
        config.budget.soft_fraction = 0.9;
        config.budget.hard_fraction = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_flush_chars() {
        let mut config = AtlasConfig::default();
        config.synth.flush_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("policy.toml");

        let mut config = AtlasConfig::default();
        config.budget.monthly_cap_usd = 42.0;
        config.vad.threshold = 0.6;
        config.save_to_file(&path).expect("save");

        let loaded = AtlasConfig::from_file(&path).expect("load");
        assert_eq!(loaded.budget.monthly_cap_usd, 42.0);
        assert!((loaded.vad.threshold - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "[budget]\nmonthly_cap_usd = 5.0\n").expect("write");

        let loaded = AtlasConfig::from_file(&path).expect("load");
        assert_eq!(loaded.budget.monthly_cap_usd, 5.0);
        // Untouched sections fall back to defaults.
        assert_eq!(loaded.vad.min_speech_ms, 250);
        assert_eq!(loaded.synth.flush_chars, 200);
    }

    #[test]
    fn missing_file_load_errors() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("does-not-exist.toml");
        assert!(AtlasConfig::from_file(&path).is_err());
    }

    #[test]
    fn toml_serialization_contains_expected_keys() {
        let config = AtlasConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        assert!(toml_str.contains("[vad]"));
        assert!(toml_str.contains("[router]"));
        assert!(toml_str.contains("[budget]"));
        assert!(toml_str.contains("[tiers.local]"));
        assert!(toml_str.contains("[tiers.fast]"));
        assert!(toml_str.contains("[tiers.agent]"));
    }
}
