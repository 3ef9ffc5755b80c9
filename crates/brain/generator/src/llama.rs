use llamabrain_types::ModelFingerprint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{CompletionRequest, CompletionResponse, GeneratorBackend};
use crate::error::GeneratorError;
use crate::params::{OutputMode, UsageMetrics};

/// Wire request for the llama-server `/completion` endpoint.
#[derive(Debug, Serialize)]
struct LlamaCompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    stop: &'a [String],
    cache_prompt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<&'a Value>,
}

/// Wire response fields consumed from llama-server.
#[derive(Debug, Deserialize)]
struct LlamaCompletionResponse {
    content: String,
    #[serde(default)]
    stop: bool,
    #[serde(default)]
    tokens_predicted: u32,
    #[serde(default)]
    tokens_cached: u32,
    #[serde(default)]
    tokens_evaluated: u32,
    #[serde(default)]
    timings: Option<LlamaTimings>,
}

#[derive(Debug, Deserialize)]
struct LlamaTimings {
    #[serde(default)]
    prompt_ms: Option<f64>,
    #[serde(default)]
    predicted_ms: Option<f64>,
}

/// HTTP backend for a llama-server instance.
pub struct LlamaServerBackend {
    client: reqwest::Client,
    base_url: String,
    fingerprint: ModelFingerprint,
    supports_structured: bool,
}

impl LlamaServerBackend {
    pub fn new(base_url: impl Into<String>, fingerprint: ModelFingerprint) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fingerprint,
            supports_structured: true,
        }
    }

    /// Declare that the server build lacks schema/grammar enforcement; the
    /// façade will downgrade structured requests to free-form.
    pub fn without_structured_support(mut self) -> Self {
        self.supports_structured = false;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/completion", self.base_url)
    }
}

#[async_trait]
impl GeneratorBackend for LlamaServerBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GeneratorError> {
        let schema = match &request.mode {
            OutputMode::Structured { schema } => Some(schema),
            OutputMode::FreeForm => None,
        };
        let wire = LlamaCompletionRequest {
            prompt: &request.prompt,
            n_predict: request.params.n_predict,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            top_k: request.params.top_k,
            repeat_penalty: request.params.repeat_penalty,
            stop: &request.params.stop,
            cache_prompt: request.params.cache_prompt,
            seed: request.seed,
            json_schema: schema,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&wire)
            .send()
            .await
            .map_err(|e|

                if e.is_timeout() {
                    GeneratorError::Timeout { elapsed_ms: 0 }
                } else {
                    GeneratorError::Network(e.to_string())
                })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(GeneratorError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // llama-server answers 400 when it cannot honor the constraint.
            if status.as_u16() == 400 && schema.is_some() {
                return Err(GeneratorError::SchemaRejection(body));
            }
            return Err(GeneratorError::Network(format!("{status}: {body}")));
        }

        let parsed: LlamaCompletionResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;

        debug!(
            tokens_predicted = parsed.tokens_predicted,
            tokens_cached = parsed.tokens_cached,
            stopped = parsed.stop,
            "llama-server completion"
        );

        Ok(CompletionResponse {
            text: parsed.content,
            usage: UsageMetrics {
                tokens_predicted: parsed.tokens_predicted,
                tokens_cached: parsed.tokens_cached,
                tokens_evaluated: parsed.tokens_evaluated,
                prompt_ms: parsed.timings.as_ref().and_then(|t| t.prompt_ms),
                predicted_ms: parsed.timings.as_ref().and_then(|t| t.predicted_ms),
            },
            stopped: parsed.stop,
        })
    }

    fn supports_structured(&self) -> bool {
        self.supports_structured
    }

    fn fingerprint(&self) -> ModelFingerprint {
        self.fingerprint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SamplingParams;

    #[test]
    fn wire_request_shape() {
        let params = SamplingParams::default();
        let schema = serde_json::json!({"type": "object"});
        let wire = LlamaCompletionRequest {
            prompt: "Guard:",
            n_predict: params.n_predict,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repeat_penalty,
            stop: &params.stop,
            cache_prompt: params.cache_prompt,
            seed: Some(7),
            json_schema: Some(&schema),
        };
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["prompt"], "Guard:");
        assert_eq!(json["n_predict"], 256);
        assert_eq!(json["seed"], 7);
        assert!(json["json_schema"].is_object());
    }

    #[test]
    fn seed_omitted_when_absent() {
        let params = SamplingParams::default();
        let wire = LlamaCompletionRequest {
            prompt: "Guard:",
            n_predict: params.n_predict,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repeat_penalty,
            stop: &params.stop,
            cache_prompt: params.cache_prompt,
            seed: None,
            json_schema: None,
        };
        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("seed").is_none());
        assert!(json.get("json_schema").is_none());
    }

    #[test]
    fn wire_response_parses_with_timings() {
        let raw = r#"{
            "content": "Halt! Who goes there?",
            "stop": true,
            "tokens_predicted": 7,
            "tokens_cached": 120,
            "tokens_evaluated": 512,
            "timings": {"prompt_ms": 81.5, "prompt_n": 512, "predicted_ms": 220.0, "predicted_n": 7}
        }"#;
        let parsed: LlamaCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.stop);
        assert_eq!(parsed.tokens_predicted, 7);
        assert_eq!(parsed.timings.unwrap().prompt_ms, Some(81.5));
    }

    #[test]
    fn wire_response_tolerates_minimal_body() {
        let parsed: LlamaCompletionResponse =
            serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(parsed.content, "hello");
        assert!(!parsed.stop);
        assert!(parsed.timings.is_none());
    }

    #[test]
    fn base_url_trailing_slash_normalized() {
        let backend = LlamaServerBackend::new(
            "http://127.0.0.1:8080/",
            ModelFingerprint::new("m", "Q4_K_M", "8B", semver::Version::new(1, 0, 0)),
        );
        assert_eq!(backend.endpoint(), "http://127.0.0.1:8080/completion");
    }
}
