use thiserror::Error;

/// Typed, non-fatal generator failures. All of them propagate to the retry
/// policy; none abort the pipeline directly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeneratorError {
    #[error("generator call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("generator transport failed: {0}")]
    Network(String),

    #[error("generator rate limited{}", retry_after_ms.map(|ms| format!(" (retry after {ms}ms)")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("backend rejected the output schema: {0}")]
    SchemaRejection(String),

    #[error("generator returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl GeneratorError {
    /// Whether the retry policy may re-attempt after this failure.
    /// A schema rejection is terminal: the façade has already fallen back to
    /// free-form once, so retrying cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GeneratorError::SchemaRejection(_))
    }
}
