use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sampling parameters forwarded to the model server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub n_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub stop: Vec<String>,
    pub cache_prompt: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            n_predict: 256,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.1,
            stop: vec!["</s>".to_string(), "Player:".to_string()],
            cache_prompt: true,
        }
    }
}

/// Requested output shape.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputMode {
    /// No constraint on the response text.
    FreeForm,
    /// The backend is asked to enforce a JSON schema. If it cannot, the
    /// façade falls back to free-form and flags the parser.
    Structured { schema: Value },
}

impl OutputMode {
    pub fn is_structured(&self) -> bool {
        matches!(self, OutputMode::Structured { .. })
    }
}

/// Usage accounting consumed from the model server response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub tokens_predicted: u32,
    pub tokens_cached: u32,
    pub tokens_evaluated: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_ms: Option<f64>,
}
