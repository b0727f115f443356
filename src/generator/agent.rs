//! AGENT tier: remote high-capability orchestrated backend.
//!
//! Shares its HTTP/SSE transport with the FAST tier (same OpenAI-compatible
//! wire format) via [`super::fast::RemoteAdapter`]; this module exists as the
//! named construction point the startup wiring uses, and is where
//! AGENT-specific behavior (e.g. a different wire format) would diverge if
//! the underlying provider required it.

pub use super::fast::RemoteAdapter as AgentAdapter;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;
    use crate::generator::GeneratorAdapter;
    use crate::router::Tier;

    #[test]
    fn agent_adapter_reports_agent_tier() {
        let config = TierConfig {
            ttft_deadline_ms: 4_000,
            total_deadline_ms: 30_000,
            unit_cost: 0.0,
            base_url: "https://example.invalid".into(),
            api_key: String::new(),
            model: "claude-agent".into(),
        };
        let adapter = AgentAdapter::agent(config);
        assert_eq!(adapter.tier(), Tier::Agent);
    }
}
