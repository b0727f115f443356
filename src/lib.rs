//! ATLAS: a hybrid voice routing core.
//!
//! Routes each spoken utterance to one of three generation tiers — LOCAL
//! (in-process, free), FAST (remote, low-latency), or AGENT (remote,
//! high-capability) — balancing latency and spend against a configurable
//! budget, and speaks the response back as streaming synthesized audio.
//!
//! # Architecture
//!
//! One Turn flows through these stages, wired in [`startup::build_pipeline`]:
//!
//! - **VAD** ([`vad`]): brackets speech with hysteresis over a pluggable
//!   speech-probability backend.
//! - **STT** ([`stt`]): transcribes one bracketed span at a time.
//! - **Router** ([`router`]): a rule stage, a semantic stage, and a budget
//!   gate decide the tier and category.
//! - **Generator** ([`generator`]): one of three adapters streams tokens for
//!   the decided tier, downgrading once per tier on failure.
//! - **Synthesizer** ([`synth`]): chunks tokens into sentences and
//!   synthesizes each as an `AudioSegment`.
//! - **Filler** ([`filler`]): speaks a neutral phrase while a remote tier is
//!   still generating.
//! - **Ledger** ([`ledger`]): persists usage and derives the budget mode the
//!   Router and downgrade policy consult.
//! - **Turn Controller** ([`turn`]): owns the above end to end for one Turn.
//!
//! [`clock`] provides the cancellation and deadline primitives every stage
//! uses uniformly; [`observability`] provides structured logging, metrics,
//! and secret redaction.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod filler;
pub mod generator;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod router;
pub mod startup;
pub mod stt;
pub mod synth;
pub mod turn;
pub mod vad;

pub use config::AtlasConfig;
pub use error::{AtlasError, Result};
pub use startup::{build_pipeline, Pipeline};
pub use turn::TurnController;
