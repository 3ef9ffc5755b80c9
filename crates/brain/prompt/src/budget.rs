use serde::{Deserialize, Serialize};

/// Token accounting for prompt assembly. Tokens are estimated by a linear
/// chars-per-token ratio; the reserve is held back for the model's response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_tokens: usize,
    pub response_reserve: usize,
    pub chars_per_token: f64,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            response_reserve: 512,
            chars_per_token: 4.0,
        }
    }
}

impl TokenBudget {
    /// Tokens available to the prompt itself.
    pub fn available(&self) -> usize {
        self.max_tokens.saturating_sub(self.response_reserve)
    }

    /// Estimated token cost of a text.
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let ratio = if self.chars_per_token > 0.0 {
            self.chars_per_token
        } else {
            1.0
        };
        (text.chars().count() as f64 / ratio).ceil() as usize
    }
}
