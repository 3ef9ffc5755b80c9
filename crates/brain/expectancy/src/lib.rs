//! Expectancy layer: turns an interaction context plus a registered rule set
//! into an ordered, de-duplicated [`ConstraintSet`].
//!
//! Rules are pure functions with a metadata record; the evaluator is
//! table-driven and has no I/O and no suspension points. Constraints are value
//! objects; once a set is produced it is never modified, only replaced
//! (retry escalation builds a new set).

#![deny(unsafe_code)]

mod constraint;
mod evaluator;
pub mod rules;

pub use constraint::{
    Constraint, ConstraintKind, ConstraintSet, PredicateId, Provenance, Severity,
};
pub use evaluator::{ExpectancyEvaluator, ExpectancyRule, RuleMeta};
