use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use llamabrain_types::ModelFingerprint;

use crate::error::GeneratorError;
use crate::params::{OutputMode, SamplingParams, UsageMetrics};

/// One completion request as the backend sees it.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub prompt: String,
    pub params: SamplingParams,
    pub seed: Option<u64>,
    pub mode: OutputMode,
}

/// The raw result of a completion.
#[derive(Clone, Debug)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: UsageMetrics,
    /// Whether generation hit a stop condition rather than the token limit.
    pub stopped: bool,
}

/// A completion backend. Implementations are stateless with respect to the
/// pipeline: the prompt is the entire context.
#[async_trait]
pub trait GeneratorBackend: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GeneratorError>;

    /// Whether the backend can enforce a JSON schema server-side.
    fn supports_structured(&self) -> bool;

    fn fingerprint(&self) -> ModelFingerprint;
}

/// Deterministic backend replaying scripted outcomes in order.
///
/// Used by tests and by audit replay, where the recorded outputs stand in
/// for the original model. An exhausted script is an invalid response, not a
/// panic; replays must fail loudly, not wedge.
pub struct ReplayBackend {
    fingerprint: ModelFingerprint,
    script: Mutex<VecDeque<Result<String, GeneratorError>>>,
    supports_structured: bool,
}

impl ReplayBackend {
    pub fn new(fingerprint: ModelFingerprint) -> Self {
        Self {
            fingerprint,
            script: Mutex::new(VecDeque::new()),
            supports_structured: true,
        }
    }

    pub fn without_structured_support(mut self) -> Self {
        self.supports_structured = false;
        self
    }

    pub fn respond(self, text: impl Into<String>) -> Self {
        self.push_response(text);
        self
    }

    pub fn fail(self, error: GeneratorError) -> Self {
        self.push_failure(error);
        self
    }

    pub fn push_response(&self, text: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(text.into()));
        }
    }

    pub fn push_failure(&self, error: GeneratorError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GeneratorBackend for ReplayBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GeneratorError> {
        let next = self
            .script
            .lock()
            .map_err(|_| GeneratorError::InvalidResponse("replay script lock poisoned".into()))?
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(CompletionResponse {
                usage: UsageMetrics {
                    tokens_predicted: text.split_whitespace().count() as u32,
                    tokens_evaluated: request.prompt.split_whitespace().count() as u32,
                    ..UsageMetrics::default()
                },
                stopped: true,
                text,
            }),
            Some(Err(error)) => Err(error),
            None => Err(GeneratorError::InvalidResponse(
                "replay script exhausted".into(),
            )),
        }
    }

    fn supports_structured(&self) -> bool {
        self.supports_structured
    }

    fn fingerprint(&self) -> ModelFingerprint {
        self.fingerprint.clone()
    }
}
