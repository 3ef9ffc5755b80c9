use std::sync::Arc;
use std::time::Duration;

use llamabrain_types::ModelFingerprint;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{CompletionRequest, GeneratorBackend};
use crate::error::GeneratorError;
use crate::limiter::SlidingWindowLimiter;
use crate::params::{OutputMode, SamplingParams, UsageMetrics};

/// Façade policy: timeout and throughput.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub call_timeout_ms: u64,
    /// `None` disables rate limiting (tests, replay).
    pub requests_per_minute: Option<usize>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
            requests_per_minute: Some(60),
        }
    }
}

/// The façade's result: raw text plus what actually happened to the
/// requested output mode.
#[derive(Clone, Debug)]
pub struct GenerationOutcome {
    pub raw_text: String,
    pub usage: UsageMetrics,
    /// False when a structured request was downgraded to free-form; the
    /// parser then starts in pattern mode without attempting strict JSON.
    pub schema_enforced: bool,
}

/// Stateless generator façade: `complete(prompt, params, seed)`.
pub struct Generator {
    backend: Arc<dyn GeneratorBackend>,
    limiter: Option<SlidingWindowLimiter>,
    call_timeout: Duration,
}

impl Generator {
    pub fn new(backend: Arc<dyn GeneratorBackend>, config: &GeneratorConfig) -> Self {
        Self {
            backend,
            limiter: config
                .requests_per_minute
                .map(SlidingWindowLimiter::per_minute),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }

    pub fn fingerprint(&self) -> ModelFingerprint {
        self.backend.fingerprint()
    }

    pub async fn complete(
        &self,
        prompt: &str,
        params: &SamplingParams,
        seed: Option<u64>,
        mode: OutputMode,
    ) -> Result<GenerationOutcome, GeneratorError> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let (mode, schema_enforced) = match mode {
            OutputMode::Structured { schema } if self.backend.supports_structured() => {
                (OutputMode::Structured { schema }, true)
            }
            OutputMode::Structured { .. } => {
                warn!("backend lacks structured output; falling back to free-form");
                (OutputMode::FreeForm, false)
            }
            OutputMode::FreeForm => (OutputMode::FreeForm, false),
        };

        let request = CompletionRequest {
            prompt: prompt.to_string(),
            params: params.clone(),
            seed,
            mode,
        };

        let response = tokio::time::timeout(self.call_timeout, self.backend.complete(&request))
            .await
            .map_err(|_| GeneratorError::Timeout {
                elapsed_ms: self.call_timeout.as_millis() as u64,
            })??;

        debug!(
            tokens_predicted = response.usage.tokens_predicted,
            schema_enforced,
            "generation complete"
        );

        Ok(GenerationOutcome {
            raw_text: response.text,
            usage: response.usage,
            schema_enforced,
        })
    }
}
