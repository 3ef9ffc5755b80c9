//! Retry and fallback: the state machine
//! `Attempt(n) → Validate → (Commit | Retry(n+1) | Fallback)`.
//!
//! Retries reuse the same snapshot with an escalated constraint set and a
//! seed derived from `(base_seed, attempt)`. When attempts are exhausted or
//! a terminal generator error occurs, the fallback hierarchy answers;
//! dialogue only, never a mutation.

#![deny(unsafe_code)]

mod hierarchy;
mod retry;

pub use hierarchy::{FallbackCatalog, FallbackResponse, FallbackSystem, FallbackTier};
pub use retry::{FallbackReason, RetryConfig, RetryDecision, RetryPolicy};
