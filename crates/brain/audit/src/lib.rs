//! Audit and replay: one record per finished interaction, an append-only
//! log, self-describing replay packages, and the drift detector that
//! compares a replayed run against the recorded one.

#![deny(unsafe_code)]

mod log;
mod record;
mod replay;

pub use log::AuditLog;
pub use record::{AuditRecord, InteractionFailure};
pub use replay::{Drift, DriftDetector, ReplayError, ReplayPackage};
