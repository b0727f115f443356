//! Error types for the ATLAS voice routing core.

/// Top-level error type for the voice routing pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Voice activity detection error.
    #[error("VAD error: {0}")]
    Vad(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Router classification error (rule stage or semantic stage).
    #[error("router error: {0}")]
    Router(String),

    /// Generator adapter error (LOCAL, FAST, or AGENT tier).
    #[error("generator error: {0}")]
    Generator(String),

    /// Cost ledger persistence error.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Streaming synthesis error.
    #[error("synthesis error: {0}")]
    Synth(String),

    /// Turn controller state machine error.
    #[error("turn controller error: {0}")]
    Turn(String),

    /// Model resolution or loading error.
    #[error("model error: {0}")]
    Model(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AtlasError>;
