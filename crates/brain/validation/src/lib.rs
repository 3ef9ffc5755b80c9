//! Validation gate: the checkpoint between parsed output and any state
//! mutation.
//!
//! Five layers run in a fixed order (structural, constraint compliance,
//! canonical protection, authority, intent whitelist) and a failure in one
//! layer never stops the later ones, so a single report lists every problem.
//! The gate is pure over `(ParsedOutput, StateSnapshot)`: re-running it on
//! the same inputs yields the same report.

#![deny(unsafe_code)]

mod gate;
mod predicates;
mod report;

pub use gate::{GateConfig, ValidationGate};
pub use predicates::PredicateRegistry;
pub use report::{
    FailureCategory, FailureCode, ItemRef, ValidationFailure, ValidationReport,
};
