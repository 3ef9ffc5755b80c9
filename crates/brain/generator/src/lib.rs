//! Generator façade: the LLM as a pure function.
//!
//! A single `complete(prompt, params, seed)` operation over a pluggable
//! backend. The façade owns the per-call timeout and the sliding-window rate
//! limiter; structured-output mode degrades to free-form (with a flag for
//! the parser) when the backend cannot enforce a schema. Nothing in this
//! crate holds conversation state.

#![deny(unsafe_code)]

mod backend;
mod error;
mod facade;
mod limiter;
mod llama;
mod params;

pub use backend::{CompletionRequest, CompletionResponse, GeneratorBackend, ReplayBackend};
pub use error::GeneratorError;
pub use facade::{Generator, GeneratorConfig, GenerationOutcome};
pub use limiter::SlidingWindowLimiter;
pub use llama::LlamaServerBackend;
pub use params::{OutputMode, SamplingParams, UsageMetrics};
