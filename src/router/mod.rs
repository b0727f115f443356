//! Three-stage router: decides which [`Tier`] handles an utterance.
//!
//! Cascade, early-exit: rule stage (regex matchers) → semantic stage (cosine
//! similarity against prototype centroids) → default fallback. The tentative
//! decision is then passed through the budget gate before becoming final.

mod rules;
mod semantic;

pub use rules::{RuleMatch, RuleStage};
pub use semantic::{Prototype, SemanticStage};

use crate::config::RouterConfig;
use crate::ledger::BudgetMode;
use crate::observability::{FIELD_CATEGORY, FIELD_TIER, SPAN_ROUTER_CLASSIFY};
use crate::stt::Utterance;
use tracing::info;

/// Generation backend class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Local,
    Fast,
    Agent,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Local => "local",
            Tier::Fast => "fast",
            Tier::Agent => "agent",
        }
    }

    /// One rung more capable (and more expensive) than `self`, if any.
    pub fn promote(self) -> Tier {
        match self {
            Tier::Local => Tier::Fast,
            Tier::Fast => Tier::Agent,
            Tier::Agent => Tier::Agent,
        }
    }
}

/// Utterance category assigned alongside the tier decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Command,
    Brief,
    Greeting,
    Advice,
    Explain,
    Draft,
    Plan,
    Analyze,
    Safety,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Command => "command",
            Category::Brief => "brief",
            Category::Greeting => "greeting",
            Category::Advice => "advice",
            Category::Explain => "explain",
            Category::Draft => "draft",
            Category::Plan => "plan",
            Category::Analyze => "analyze",
            Category::Safety => "safety",
            Category::Unknown => "unknown",
        }
    }
}

/// The result of classifying one utterance.
#[derive(Debug, Clone)]
pub struct TierDecision {
    pub tier: Tier,
    pub confidence: f32,
    pub category: Category,
    pub reason: &'static str,
    pub budget_override: bool,
    /// Set instead of `budget_override` when a `Safety` category decision is
    /// rewritten to LOCAL under `LOCAL_ONLY` — distinct from an ordinary
    /// budget rewrite since it is forced by the safety policy, not cost.
    pub safety_override: bool,
    pub needs_clarification: bool,
}

/// Three-stage classifier.
pub struct Router {
    rules: RuleStage,
    semantic: SemanticStage,
    config: RouterConfig,
}

impl Router {
    pub fn new(config: RouterConfig, prototypes: Vec<Prototype>) -> Self {
        Self {
            rules: RuleStage::new(),
            semantic: SemanticStage::new(prototypes),
            config,
        }
    }

    /// Classify an utterance, already accounting for the current budget mode.
    pub fn classify(&self, utterance: &Utterance, budget_mode: BudgetMode) -> TierDecision {
        let span = tracing::info_span!(SPAN_ROUTER_CLASSIFY, { crate::observability::FIELD_UTTERANCE_ID } = utterance.id);
        let _enter = span.enter();

        let tentative = self
            .rules
            .classify(&utterance.text)
            .map(|m| TierDecision {
                tier: m.tier,
                confidence: 0.95,
                category: m.category,
                reason: "rule",
                budget_override: false,
                safety_override: false,
                needs_clarification: false,
            })
            .unwrap_or_else(|| self.semantic_or_default(utterance));

        let decision = self.apply_budget_gate(tentative, budget_mode);

        info!(
            { FIELD_TIER } = decision.tier.as_str(),
            { FIELD_CATEGORY } = decision.category.as_str(),
            confidence = decision.confidence,
            reason = decision.reason,
            "router classified utterance"
        );

        decision
    }

    fn semantic_or_default(&self, utterance: &Utterance) -> TierDecision {
        match self.semantic.classify(&utterance.text) {
            Some(result) => {
                let needs_clarification = result.confidence < self.config.thresholds.abstain;
                TierDecision {
                    tier: result.tier,
                    confidence: result.confidence,
                    category: Category::Unknown,
                    reason: "semantic",
                    budget_override: false,
                    safety_override: false,
                    needs_clarification,
                }
            }
            None => TierDecision {
                tier: Tier::Fast,
                confidence: 0.5,
                category: Category::Unknown,
                reason: "default",
                budget_override: false,
                safety_override: false,
                needs_clarification: false,
            },
        }
    }

    fn apply_budget_gate(&self, mut decision: TierDecision, mode: BudgetMode) -> TierDecision {
        match mode {
            BudgetMode::Normal => decision,
            BudgetMode::Thrifty => {
                if decision.tier == Tier::Fast
                    && decision.confidence < self.config.thresholds.thrifty_keep_fast
                {
                    decision.tier = Tier::Local;
                    decision.budget_override = true;
                } else if decision.tier == Tier::Agent && decision.category != Category::Safety {
                    decision.tier = Tier::Fast;
                    decision.budget_override = true;
                }
                decision
            }
            BudgetMode::LocalOnly => {
                if decision.tier != Tier::Local {
                    decision.tier = Tier::Local;
                    if decision.category == Category::Safety {
                        decision.safety_override = true;
                    } else {
                        decision.budget_override = true;
                    }
                }
                decision
            }
        }
    }
}
