//! FAST tier: remote low-latency OpenAI-Chat-Completions-compatible API,
//! streamed over SSE.

use super::sse::{SseEvent, SseParser};
use super::{GenerationRequest, GenerationUsage, GeneratorAdapter, Token, TokenStream, UsageHandle};
use crate::clock::CancelHandle;
use crate::config::TierConfig;
use crate::error::{AtlasError, Result};
use crate::observability::redact::redact_all;
use crate::router::Tier;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tracing::info;

/// HTTP + SSE adapter for an OpenAI-compatible remote backend.
pub struct RemoteAdapter {
    tier: Tier,
    client: reqwest::Client,
    config: TierConfig,
}

impl RemoteAdapter {
    pub fn fast(config: TierConfig) -> Self {
        Self::new(Tier::Fast, config)
    }

    pub fn agent(config: TierConfig) -> Self {
        Self::new(Tier::Agent, config)
    }

    fn new(tier: Tier, config: TierConfig) -> Self {
        Self {
            tier,
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl GeneratorAdapter for RemoteAdapter {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancelHandle,
    ) -> Result<(TokenStream, UsageHandle)> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "stream": true,
            "max_tokens": request.max_output_tokens,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.prompt},
            ],
        });

        info!(
            tier = self.tier.as_str(),
            utterance_id = request.utterance_id,
            "dispatching remote generation request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AtlasError::Generator(redact_all(&format!(
                    "{} tier request failed: {e}",
                    self.tier.as_str()
                )))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AtlasError::Generator(redact_all(&format!(
                "{} tier returned {status}: {text}",
                self.tier.as_str()
            ))));
        }

        let utterance_id = request.utterance_id;
        let unit_cost = self.config.unit_cost;
        let prompt = request.prompt.clone();
        let tier_name = self.tier.as_str();
        let ttft_deadline = std::time::Duration::from_millis(request.ttft_deadline_ms);
        let total_deadline = std::time::Duration::from_millis(request.total_deadline_ms);
        let (usage_tx, usage_rx) = tokio::sync::oneshot::channel();

        let stream = try_stream! {
            let start = tokio::time::Instant::now();
            let ttft_at = start + ttft_deadline;
            let total_at = start + total_deadline;
            let mut byte_stream = response.bytes_stream();
            let mut parser = SseParser::new();
            let mut seq = 0u64;
            let mut produced_text = String::new();
            let mut first_token_seen = false;

            loop {
                if cancel.is_cancelled() {
                    // Barge-in mid-stream: no server-reported usage is coming,
                    // so report a best-effort estimate from what was actually
                    // produced rather than dropping the sender and silently
                    // committing zero cost for tokens that were really billed.
                    let input_tokens = super::estimate_tokens(&prompt);
                    let output_tokens = super::estimate_tokens(&produced_text);
                    let _ = usage_tx.send(GenerationUsage {
                        input_tokens,
                        output_tokens,
                        cost_usd: (input_tokens + output_tokens) as f64 / 1000.0 * unit_cost,
                    });
                    break;
                }

                let deadline = if first_token_seen { total_at } else { ttft_at.min(total_at) };
                let next = match tokio::time::timeout_at(deadline, byte_stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let kind = if first_token_seen { "TIMEOUT_TOTAL" } else { "TIMEOUT_TTFT" };
                        Err(AtlasError::Generator(format!(
                            "{tier_name} tier {kind}: no {} within deadline",
                            if first_token_seen { "stream completion" } else { "first token" }
                        )))?
                    }
                };
                let Some(chunk) = next else { break };
                let chunk = chunk.map_err(|e| {
                    AtlasError::Generator(redact_all(&format!("stream read error: {e}")))
                })?;

                for event in parser.push(&chunk) {
                    match event {
                        SseEvent::Delta(text) => {
                            first_token_seen = true;
                            produced_text.push_str(&text);
                            yield Token { utterance_id, text, is_final: false, seq };
                            seq += 1;
                        }
                        SseEvent::Done => {
                            yield Token {
                                utterance_id,
                                text: String::new(),
                                is_final: true,
                                seq,
                            };
                            let usage = parser.last_usage;
                            let _ = usage_tx.send(GenerationUsage {
                                input_tokens: usage.map(|u| u.prompt_tokens)
                                    .unwrap_or_else(|| super::estimate_tokens(&prompt)),
                                output_tokens: usage.map(|u| u.completion_tokens).unwrap_or(0),
                                cost_usd: usage
                                    .map(|u| {
                                        (u.prompt_tokens + u.completion_tokens) as f64
                                            / 1000.0
                                            * unit_cost
                                    })
                                    .unwrap_or(0.0),
                            });
                            return;
                        }
                    }
                }
            }
        };

        Ok((Box::pin(stream), UsageHandle::new(usage_rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt as _;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> TierConfig {
        TierConfig {
            ttft_deadline_ms: 1_500,
            total_deadline_ms: 6_000,
            unit_cost: 0.15,
            base_url,
            api_key: "test-key".into(),
            model: "gpt-4o-mini".into(),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            utterance_id: 7,
            tier: Tier::Fast,
            prompt: "what is a good warm-up for bench press".into(),
            system_prompt: "be concise".into(),
            max_output_tokens: 128,
            ttft_deadline_ms: 1_500,
            total_deadline_ms: 6_000,
        }
    }

    #[tokio::test]
    async fn streams_deltas_then_final_token() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Try \"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"a light set first.\"}}],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":8}}\n\n\
data: [DONE]\n\n";

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let adapter = RemoteAdapter::fast(config(server.uri()));
        let cancel = CancelHandle::new();
        let (mut stream, usage) = adapter.generate(request(), cancel).await.unwrap();

        let mut tokens = Vec::new();
        while let Some(token) = stream.next().await {
            tokens.push(token.unwrap());
        }

        assert!(tokens.iter().any(|t| t.text.contains("Try")));
        assert!(tokens.last().unwrap().is_final);

        let recorded = usage.usage().await.unwrap();
        assert_eq!(recorded.input_tokens, 12);
        assert_eq!(recorded.output_tokens, 8);
        assert!(recorded.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let adapter = RemoteAdapter::fast(config(server.uri()));
        let cancel = CancelHandle::new();
        let result = adapter.generate(request(), cancel).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn no_first_token_within_ttft_deadline_yields_timeout_error() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\ndata: [DONE]\n\n";

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "text/event-stream")
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let mut req = request();
        req.ttft_deadline_ms = 20;
        req.total_deadline_ms = 20;

        let adapter = RemoteAdapter::fast(config(server.uri()));
        let cancel = CancelHandle::new();
        let (mut stream, _usage) = adapter.generate(req, cancel).await.unwrap();

        let first = stream.next().await.expect("stream yields the timeout error");
        let err = first.expect_err("expected a deadline error, not a token");
        assert!(
            err.to_string().contains("TIMEOUT_TTFT"),
            "error should be distinguishable as a TTFT timeout: {err}"
        );
    }
}
