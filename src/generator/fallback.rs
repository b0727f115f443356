//! Downgrade policy the Turn Controller applies between generator tiers.
//!
//! Unlike a provider-retry chain, this is a single-attempt-per-tier policy:
//! AGENT failure falls to FAST if budget permits, else LOCAL; FAST failure
//! falls to LOCAL; LOCAL failure has nowhere left to go.

use crate::ledger::BudgetMode;
use crate::router::Tier;
use tracing::warn;

/// The outcome of consulting the downgrade policy after a tier failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowngradeOutcome {
    /// Retry the turn on this tier.
    Retry(Tier),
    /// No tier remains; the Turn Controller must speak the fixed refusal.
    Exhausted,
}

/// Stateless policy: given the tier that just failed and the current budget
/// mode, decide the next tier to try. Each tier is attempted at most once per
/// turn, so the caller is responsible for not calling this twice for the same
/// tier within one turn.
#[derive(Debug, Default)]
pub struct DowngradePolicy;

impl DowngradePolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn next_after_failure(&self, failed: Tier, budget_mode: BudgetMode) -> DowngradeOutcome {
        let outcome = match failed {
            Tier::Agent => {
                if budget_mode == BudgetMode::LocalOnly {
                    DowngradeOutcome::Retry(Tier::Local)
                } else {
                    DowngradeOutcome::Retry(Tier::Fast)
                }
            }
            Tier::Fast => DowngradeOutcome::Retry(Tier::Local),
            Tier::Local => DowngradeOutcome::Exhausted,
        };

        match outcome {
            DowngradeOutcome::Retry(to) => {
                warn!(from = failed.as_str(), to = to.as_str(), "tier downgrade");
            }
            DowngradeOutcome::Exhausted => {
                warn!(from = failed.as_str(), "downgrade chain exhausted");
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_falls_to_fast_under_normal_budget() {
        let policy = DowngradePolicy::new();
        assert_eq!(
            policy.next_after_failure(Tier::Agent, BudgetMode::Normal),
            DowngradeOutcome::Retry(Tier::Fast)
        );
    }

    #[test]
    fn agent_falls_to_local_when_budget_is_local_only() {
        let policy = DowngradePolicy::new();
        assert_eq!(
            policy.next_after_failure(Tier::Agent, BudgetMode::LocalOnly),
            DowngradeOutcome::Retry(Tier::Local)
        );
    }

    #[test]
    fn fast_always_falls_to_local() {
        let policy = DowngradePolicy::new();
        assert_eq!(
            policy.next_after_failure(Tier::Fast, BudgetMode::Normal),
            DowngradeOutcome::Retry(Tier::Local)
        );
        assert_eq!(
            policy.next_after_failure(Tier::Fast, BudgetMode::Thrifty),
            DowngradeOutcome::Retry(Tier::Local)
        );
    }

    #[test]
    fn local_failure_exhausts_the_chain() {
        let policy = DowngradePolicy::new();
        assert_eq!(
            policy.next_after_failure(Tier::Local, BudgetMode::Normal),
            DowngradeOutcome::Exhausted
        );
    }
}
