//! Context retrieval: select a bounded, deterministic set of memories and
//! freeze them, together with the interaction context, constraints, system
//! prompt, and dialogue tail, into an immutable [`StateSnapshot`].
//!
//! Scoring is a weighted sum of recency, relevance, and decayed significance;
//! every tie is broken by the strict total order, so two executions over the
//! same state produce byte-identical output.

#![deny(unsafe_code)]

mod retriever;
mod score;
mod snapshot;

pub use retriever::{ContextRetriever, RetrievalConfig};
pub use score::{relevance_overlap, tokenize, RetrievalSignals};
pub use snapshot::StateSnapshot;
