//! Rule stage: sub-millisecond regex matching against four priority groups
//! (safety-critical, multi-tool/plan, command/greeting/brief, refusal). First
//! match wins.

use super::{Category, Tier};
use regex::Regex;

/// A rule-stage hit.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch {
    pub tier: Tier,
    pub category: Category,
}

struct Rule {
    pattern: Regex,
    tier: Tier,
    category: Category,
}

/// Ordered regex matchers. Built once at construction; matching is a linear
/// scan, cheap enough to run on every utterance before the semantic stage.
pub struct RuleStage {
    rules: Vec<Rule>,
}

impl RuleStage {
    pub fn new() -> Self {
        let specs: &[(&str, Tier, Category)] = &[
            // Safety-critical — force AGENT.
            (
                r"(?i)\b(hurt myself|kill myself|suicide|self[- ]harm|end my life)\b",
                Tier::Agent,
                Category::Safety,
            ),
            (
                r"(?i)\b(overdose|poison(ed|ing)?) (myself|someone)\b",
                Tier::Agent,
                Category::Safety,
            ),
            // Multi-tool / plan — force AGENT unless budget blocks.
            (
                r"(?i)\b(plan|schedule|organize) .*(week|month|trip|project)\b",
                Tier::Agent,
                Category::Plan,
            ),
            (
                r"(?i)\banalyze (this|my|the) .* (data|spreadsheet|report)\b",
                Tier::Agent,
                Category::Analyze,
            ),
            // Command / greeting / brief-info — force LOCAL.
            (
                r"(?i)^(set|start|stop|cancel|pause|resume) (a |an |the )?(timer|alarm|reminder)\b",
                Tier::Local,
                Category::Command,
            ),
            (
                r"(?i)^(hi|hello|hey|good morning|good evening)\b",
                Tier::Local,
                Category::Greeting,
            ),
            (
                r"(?i)^what('s| is) the (time|date|weather)\b",
                Tier::Local,
                Category::Brief,
            ),
            // Explicit refusal phrases — force LOCAL, category command.
            (
                r"(?i)\b(never mind|cancel that|forget it|stop listening)\b",
                Tier::Local,
                Category::Command,
            ),
        ];

        let rules = specs
            .iter()
            .map(|(pattern, tier, category)| Rule {
                pattern: Regex::new(pattern).expect("static rule pattern is valid regex"),
                tier: *tier,
                category: *category,
            })
            .collect();

        Self { rules }
    }

    /// Return the first matching rule, if any.
    pub fn classify(&self, text: &str) -> Option<RuleMatch> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .map(|rule| RuleMatch {
                tier: rule.tier,
                category: rule.category,
            })
    }
}

impl Default for RuleStage {
    fn default() -> Self {
        Self::new()
    }
}
