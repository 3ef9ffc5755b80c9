use llamabrain_fallback::RetryConfig;
use llamabrain_generator::{GeneratorConfig, SamplingParams};
use llamabrain_memory::MemoryConfig;
use llamabrain_prompt::TokenBudget;
use llamabrain_retrieval::RetrievalConfig;
use llamabrain_validation::GateConfig;
use serde::{Deserialize, Serialize};

/// Interaction-level bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Wall-clock budget per interaction; expiry transitions to fallback.
    pub interaction_timeout_ms: u64,
    /// Player input longer than this is rejected as invalid.
    pub max_player_input_chars: usize,
    /// Dialogue turns carried into the prompt.
    pub history_tail: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            interaction_timeout_ms: 30_000,
            max_player_input_chars: 2_000,
            history_tail: 12,
        }
    }
}

/// Complete runtime configuration, one section per subsystem.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub memory: MemoryConfig,
    pub retrieval: RetrievalConfig,
    pub budget: TokenBudget,
    pub sampling: SamplingParams,
    pub generator: GeneratorConfig,
    pub retry: RetryConfig,
    pub gate: GateConfig,
    pub limits: LimitsConfig,
    /// Request schema-enforced output from the backend when it supports it.
    pub structured_output: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_compose() {
        let config = RuntimeConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.limits.interaction_timeout_ms, 30_000);
        assert!(!config.structured_output);
    }

    #[test]
    fn config_serializes() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.limits.history_tail, config.limits.history_tail);
    }
}
