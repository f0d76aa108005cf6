use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use super::{GenerateRequest, GenerateResponse, Provider};

/// Thin observability shell around a single provider. Synthesis failures
/// are the pipeline's one unrecovered failure point: no retry, no fallback,
/// the error propagates to the caller as-is.
pub struct LlmClient {
    pub provider: Arc<dyn Provider>,
    pub provider_name: String,
}

impl LlmClient {
    pub async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %self.provider_name,
            gen_ai.request.model = %req.model,
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            report.stage = %req.stage,
            error.type = tracing::field::Empty,
        );

        tracing::debug!(
            parent: &span,
            prompt = %truncate(&req.prompt, 1000),
            system = %truncate(&req.system, 500),
            "Sending LLM request"
        );

        let result = self.provider.generate(req).instrument(span.clone()).await;

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(mut resp) => {
                resp.provider = self.provider_name.clone();

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                tracing::info!(
                    provider = %self.provider_name,
                    model = %resp.model,
                    input_tokens = resp.input_tokens,
                    output_tokens = resp.output_tokens,
                    duration_ms,
                    "LLM call completed"
                );

                Ok(resp)
            }
            Err(err) => {
                span.record("error.type", classify_error(&err));

                tracing::error!(
                    provider = %self.provider_name,
                    model = %req.model,
                    error = %err,
                    duration_ms,
                    "LLM call failed"
                );

                Err(err)
            }
        }
    }
}

fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    if msg.contains("rate limit") || msg.contains("429") {
        "rate_limit"
    } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        "timeout"
    } else if msg.contains("401")
        || msg.contains("403")
        || msg.contains("auth")
        || msg.contains("api key")
    {
        "auth_error"
    } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
        "invalid_request"
    } else if msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("server")
    {
        "server_error"
    } else if msg.contains("connect")
        || msg.contains("dns")
        || msg.contains("network")
        || msg.contains("reset")
    {
        "network_error"
    } else {
        "unknown_error"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}
