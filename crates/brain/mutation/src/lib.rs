//! Application of approved mutations and dispatch of approved intents.
//!
//! The controller re-checks authority against live state, stages every write,
//! and applies the batch all-or-nothing: a failure surfaces as
//! `MutationRejected` with memory untouched and the interaction ending as a
//! degraded success. The dispatcher is best-effort; handler failures are
//! recorded for the audit trail, never retried, and never block the
//! pipeline's success signal.

#![deny(unsafe_code)]

mod controller;
mod dispatcher;

pub use controller::{CommitOutcome, MutationController, MutationError};
pub use dispatcher::{
    DispatchOutcome, DispatchRecord, IntentError, IntentHandler, WorldIntentDispatcher,
};
