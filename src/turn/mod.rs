//! Turn controller: the state machine that owns one conversational turn end
//! to end — classification, generation dispatch with downgrade-on-failure,
//! filler playback, and streaming synthesis — and commits its cost to the
//! ledger.
//!
//! Turns are strictly sequential: the controller never starts a new turn
//! while the previous one's state is anything but `Done` or `Cancelled`.
//! Barge-in cancels the active turn's cancel handle, which transitively
//! cancels its generation and synthesis children, and the controller is then
//! free to accept the next turn immediately.

use crate::audio::AudioSegment;
use crate::clock::CancelHandle;
use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::filler::FillerPlayer;
use crate::generator::{DowngradeOutcome, DowngradePolicy, GenerationRequest, GeneratorAdapter};
use crate::ledger::{CostLedger, UsageRecord};
use crate::router::{Router, Tier, TierDecision};
use crate::stt::Utterance;
use crate::synth::{SegmentStream, StreamingSynthesizer};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Turn lifecycle state, surfaced for logging and `atlasctl status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Classifying,
    Dispatching,
    Speaking,
    Done,
    Cancelled,
}

/// The three generator adapters, one per tier.
pub struct GeneratorTable {
    pub local: Arc<dyn GeneratorAdapter>,
    pub fast: Arc<dyn GeneratorAdapter>,
    pub agent: Arc<dyn GeneratorAdapter>,
}

impl GeneratorTable {
    fn get(&self, tier: Tier) -> Arc<dyn GeneratorAdapter> {
        match tier {
            Tier::Local => self.local.clone(),
            Tier::Fast => self.fast.clone(),
            Tier::Agent => self.agent.clone(),
        }
    }
}

/// Owns the full per-turn pipeline: router → generator → synthesizer →
/// ledger, plus filler coordination.
pub struct TurnController {
    router: Arc<Router>,
    ledger: Arc<CostLedger>,
    generators: GeneratorTable,
    downgrade: DowngradePolicy,
    synthesizer: Arc<StreamingSynthesizer>,
    filler: Arc<FillerPlayer>,
    config: AtlasConfig,
}

impl TurnController {
    pub fn new(
        router: Arc<Router>,
        ledger: Arc<CostLedger>,
        generators: GeneratorTable,
        synthesizer: Arc<StreamingSynthesizer>,
        filler: Arc<FillerPlayer>,
        config: AtlasConfig,
    ) -> Self {
        Self {
            router,
            ledger,
            generators,
            downgrade: DowngradePolicy::new(),
            synthesizer,
            filler,
            config,
        }
    }

    /// Run one turn to completion. Returns a channel of audio segments as
    /// they're synthesized; the channel closes once the turn reaches `Done`
    /// or `Cancelled`. `cancel` is the turn's root handle — cancelling it
    /// (barge-in) stops generation, synthesis, and filler playback.
    pub fn run_turn(
        self: &Arc<Self>,
        utterance: Utterance,
        cancel: CancelHandle,
    ) -> mpsc::Receiver<Result<AudioSegment>> {
        let (tx, rx) = mpsc::channel(16);
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.drive_turn(utterance, cancel, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        rx
    }

    async fn drive_turn(
        &self,
        utterance: Utterance,
        cancel: CancelHandle,
        tx: mpsc::Sender<Result<AudioSegment>>,
    ) -> Result<()> {
        let sample_rate = self.config.audio.output_sample_rate;
        let budget_mode = self.ledger.budget_state().mode;
        let decision = self.router.classify(&utterance, budget_mode);

        info!(
            utterance_id = utterance.id,
            tier = decision.tier.as_str(),
            "turn dispatching"
        );

        // The filler races against dispatch-through-first-segment: whichever
        // finishes first may produce audio, and both are forwarded through
        // `tx` in the order they actually resolve, renumbered so `seq` stays
        // strictly increasing across the whole turn.
        let filler_cancel = cancel.child();
        let mut filler_fut = Box::pin(self.filler.play(utterance.id, sample_rate, &filler_cancel));
        let mut filler_pending = true;
        let mut next_seq = 0u64;

        let dispatch = self.generate_with_downgrade(&utterance, decision.clone(), budget_mode, cancel.clone());
        tokio::pin!(dispatch);

        let outcome = loop {
            tokio::select! {
                biased;
                result = &mut dispatch => break result,
                filler_result = &mut filler_fut, if filler_pending => {
                    filler_pending = false;
                    if let Ok(Some(mut segment)) = filler_result {
                        segment.seq = next_seq;
                        segment.is_final = false;
                        next_seq += 1;
                        if tx.send(Ok(segment)).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        };
        filler_cancel.cancel();

        match outcome {
            Ok((mut segments, usage_handle, tier, first)) => {
                if let Some(segment) = first {
                    let mut segment = segment?;
                    segment.seq = next_seq;
                    next_seq += 1;
                    if tx.send(Ok(segment)).await.is_err() {
                        return Ok(());
                    }
                }

                while let Some(segment) = segments.next().await {
                    let mut segment = segment?;
                    segment.seq = next_seq;
                    next_seq += 1;
                    if tx.send(Ok(segment)).await.is_err() {
                        break;
                    }
                }

                let usage = usage_handle.usage().await.unwrap_or_default();
                self.ledger.record(UsageRecord::from_generation(
                    utterance.id,
                    tier,
                    decision.category,
                    usage,
                ))?;
            }
            Err(_) => {
                warn!(utterance_id = utterance.id, "all tiers exhausted, speaking refusal");
                let refusal = self.config.persona.refusal_phrase.clone();
                let samples = self.synthesizer.synthesize_one(&refusal, sample_rate).await?;
                let _ = tx
                    .send(Ok(AudioSegment {
                        utterance_id: utterance.id,
                        seq: next_seq,
                        sample_rate,
                        samples,
                        is_final: true,
                    }))
                    .await;
            }
        }

        Ok(())
    }

    /// Try the decided tier, downgrading once per failed tier per the
    /// downgrade policy, until a tier succeeds or the chain is exhausted.
    ///
    /// A tier "fails" either by erroring out of `generate` itself (e.g. the
    /// initial HTTP call) or by erroring on its first synthesized segment
    /// (e.g. a TTFT timeout raised from inside the token stream) — both are
    /// fed to the same downgrade policy rather than letting the latter fail
    /// the whole turn silently past it.
    #[allow(clippy::type_complexity)]
    async fn generate_with_downgrade(
        &self,
        utterance: &Utterance,
        decision: TierDecision,
        budget_mode: crate::ledger::BudgetMode,
        cancel: CancelHandle,
    ) -> Result<(
        SegmentStream,
        crate::generator::UsageHandle,
        Tier,
        Option<Result<AudioSegment>>,
    )> {
        let mut tier = decision.tier;
        loop {
            let adapter = self.generators.get(tier);
            let request = self.build_request(utterance, tier);
            let attempt = match adapter.generate(request, cancel.child()).await {
                Ok((tokens, usage)) => {
                    let mut segments = self.synthesizer.synthesize_stream(tokens, cancel.child());
                    match segments.next().await {
                        Some(Err(e)) => Err(e),
                        first => Ok((segments, usage, first)),
                    }
                }
                Err(e) => Err(e),
            };

            match attempt {
                Ok((segments, usage, first)) => return Ok((segments, usage, tier, first)),
                Err(e) => {
                    warn!(utterance_id = utterance.id, tier = tier.as_str(), error = %e, "tier failed");
                    match self.downgrade.next_after_failure(tier, budget_mode) {
                        DowngradeOutcome::Retry(next) => tier = next,
                        DowngradeOutcome::Exhausted => {
                            return Err(AtlasError::Turn(format!(
                                "all tiers exhausted for utterance {}",
                                utterance.id
                            )));
                        }
                    }
                }
            }
        }
    }

    fn build_request(&self, utterance: &Utterance, tier: Tier) -> GenerationRequest {
        let tier_config = match tier {
            Tier::Local => &self.config.tiers.local,
            Tier::Fast => &self.config.tiers.fast,
            Tier::Agent => &self.config.tiers.agent,
        };
        GenerationRequest {
            utterance_id: utterance.id,
            tier,
            prompt: utterance.text.clone(),
            system_prompt: default_system_prompt(),
            max_output_tokens: 512,
            ttft_deadline_ms: tier_config.ttft_deadline_ms,
            total_deadline_ms: tier_config.total_deadline_ms,
        }
    }
}

fn default_system_prompt() -> String {
    "Respond concisely, as a spoken voice assistant would.".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FillerConfig, SynthConfig, TierConfig};
    use crate::generator::local::LocalAdapter;
    use crate::ledger::BudgetConfig;
    use crate::router::RouterConfig;
    use crate::synth::ToneSynthesisBackend;
    use std::time::Instant;

    fn test_controller() -> Arc<TurnController> {
        let router = Arc::new(Router::new(RouterConfig::default(), vec![]));
        let ledger = Arc::new(CostLedger::open_in_memory(BudgetConfig::default()).unwrap());
        let generators = GeneratorTable {
            local: Arc::new(LocalAdapter::new()),
            fast: Arc::new(LocalAdapter::new()),
            agent: Arc::new(LocalAdapter::new()),
        };
        let synthesizer = Arc::new(StreamingSynthesizer::new(
            Arc::new(ToneSynthesisBackend),
            SynthConfig::default(),
            24_000,
        ));
        let filler = Arc::new(FillerPlayer::new(
            FillerConfig { phrases: vec![] },
            synthesizer.clone(),
        ));
        let mut config = AtlasConfig::default();
        config.tiers.local = TierConfig {
            ttft_deadline_ms: 500,
            total_deadline_ms: 3_000,
            unit_cost: 0.0,
            base_url: String::new(),
            api_key: String::new(),
            model: "local-small".into(),
        };
        Arc::new(TurnController::new(
            router, ledger, generators, synthesizer, filler, config,
        ))
    }

    fn utterance(text: &str) -> Utterance {
        Utterance {
            id: 1,
            text: text.into(),
            stt_confidence: 0.9,
            t_speech_end: Instant::now(),
            t_transcript_ready: Instant::now(),
        }
    }

    #[tokio::test]
    async fn completes_a_turn_and_emits_a_final_segment() {
        let controller = test_controller();
        let mut rx = controller.run_turn(utterance("hello there"), CancelHandle::new());

        let mut saw_final = false;
        while let Some(segment) = rx.recv().await {
            let segment = segment.unwrap();
            if segment.is_final {
                saw_final = true;
            }
        }
        assert!(saw_final);
    }

    #[tokio::test]
    async fn barge_in_cancels_turn_before_completion() {
        let controller = test_controller();
        let cancel = CancelHandle::new();
        let mut rx = controller.run_turn(utterance("hello there"), cancel.clone());
        cancel.cancel();

        // Draining should not hang even though the turn was cancelled
        // immediately after dispatch.
        while rx.recv().await.is_some() {}
    }

    struct FailingAdapter {
        tier: Tier,
    }

    #[async_trait::async_trait]
    impl crate::generator::GeneratorAdapter for FailingAdapter {
        fn tier(&self) -> Tier {
            self.tier
        }

        async fn generate(
            &self,
            _request: crate::generator::GenerationRequest,
            _cancel: CancelHandle,
        ) -> Result<(crate::generator::TokenStream, crate::generator::UsageHandle)> {
            Err(crate::error::AtlasError::Generator("simulated TTFT timeout".into()))
        }
    }

    /// A FAST-tier failure (e.g. a TTFT timeout) downgrades once to LOCAL
    /// rather than failing the whole turn.
    #[tokio::test]
    async fn fast_tier_failure_downgrades_to_local() {
        let router = Arc::new(Router::new(RouterConfig::default(), vec![]));
        let ledger = Arc::new(CostLedger::open_in_memory(BudgetConfig::default()).unwrap());
        let generators = GeneratorTable {
            local: Arc::new(LocalAdapter::new()),
            fast: Arc::new(FailingAdapter { tier: Tier::Fast }),
            agent: Arc::new(LocalAdapter::new()),
        };
        let synthesizer = Arc::new(StreamingSynthesizer::new(
            Arc::new(ToneSynthesisBackend),
            SynthConfig::default(),
            24_000,
        ));
        let filler = Arc::new(FillerPlayer::new(
            FillerConfig { phrases: vec![] },
            synthesizer.clone(),
        ));
        let controller = Arc::new(TurnController::new(
            router,
            ledger,
            generators,
            synthesizer,
            filler,
            AtlasConfig::default(),
        ));

        let mut rx = controller.run_turn(
            utterance("what's a good warm-up for bench"),
            CancelHandle::new(),
        );
        let mut saw_final = false;
        while let Some(segment) = rx.recv().await {
            let segment = segment.unwrap();
            if segment.is_final {
                saw_final = true;
            }
        }
        assert!(saw_final);
    }

    /// Mimics a FAST adapter whose `generate` call succeeds (the HTTP
    /// connection opened fine) but whose token stream immediately errors —
    /// the shape a TTFT timeout raised from inside `RemoteAdapter::generate`
    /// takes. This must downgrade the same as an upfront `generate` failure.
    struct StreamErrorAdapter {
        tier: Tier,
    }

    #[async_trait::async_trait]
    impl crate::generator::GeneratorAdapter for StreamErrorAdapter {
        fn tier(&self) -> Tier {
            self.tier
        }

        async fn generate(
            &self,
            _request: crate::generator::GenerationRequest,
            _cancel: CancelHandle,
        ) -> Result<(crate::generator::TokenStream, crate::generator::UsageHandle)> {
            use futures_util::stream;
            let (_tx, rx) = tokio::sync::oneshot::channel();
            let err_stream = stream::once(async {
                Err(crate::error::AtlasError::Generator(
                    "fast tier TIMEOUT_TTFT: no first token within deadline".into(),
                ))
            });
            Ok((Box::pin(err_stream), crate::generator::UsageHandle::new(rx)))
        }
    }

    #[tokio::test]
    async fn ttft_timeout_surfaced_from_the_token_stream_downgrades_to_local() {
        let router = Arc::new(Router::new(RouterConfig::default(), vec![]));
        let ledger = Arc::new(CostLedger::open_in_memory(BudgetConfig::default()).unwrap());
        let generators = GeneratorTable {
            local: Arc::new(LocalAdapter::new()),
            fast: Arc::new(StreamErrorAdapter { tier: Tier::Fast }),
            agent: Arc::new(LocalAdapter::new()),
        };
        let synthesizer = Arc::new(StreamingSynthesizer::new(
            Arc::new(ToneSynthesisBackend),
            SynthConfig::default(),
            24_000,
        ));
        let filler = Arc::new(FillerPlayer::new(
            FillerConfig { phrases: vec![] },
            synthesizer.clone(),
        ));
        let controller = Arc::new(TurnController::new(
            router,
            ledger,
            generators,
            synthesizer,
            filler,
            AtlasConfig::default(),
        ));

        let mut rx = controller.run_turn(
            utterance("what's a good warm-up for bench"),
            CancelHandle::new(),
        );
        let mut saw_final = false;
        while let Some(segment) = rx.recv().await {
            let segment = segment.unwrap();
            if segment.is_final {
                saw_final = true;
            }
        }
        assert!(saw_final, "turn should complete via LOCAL downgrade, not fail outright");
    }
}
