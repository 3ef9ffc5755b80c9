use std::collections::BTreeSet;

use llamabrain_expectancy::{Constraint, PredicateId, Severity};
use llamabrain_types::{Authority, ProposedMutation, WorldIntent};
use serde::Serialize;

/// Which layer a failure came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Structural,
    Constraint,
    Canonical,
    Authority,
    Intent,
}

/// Categorical failure codes. These are data, not prose; the retry policy
/// and the audit record both dispatch on them.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureCode {
    MissingRequiredField { field: String },
    ValueOutOfRange { field: String, value: f64 },
    RequirementUnmet { predicate: PredicateId },
    ProhibitionViolated { predicate: PredicateId },
    UnknownPredicate { predicate: PredicateId },
    CanonicalFactProtected { subject: String },
    CanonicalContradiction { subject: String },
    AuthorityExceeded { claimed: Authority, granted: Authority },
    UnknownIntentType { intent_type: String },
}

impl FailureCode {
    pub fn category(&self) -> FailureCategory {
        match self {
            FailureCode::MissingRequiredField { .. } | FailureCode::ValueOutOfRange { .. } => {
                FailureCategory::Structural
            }
            FailureCode::RequirementUnmet { .. }
            | FailureCode::ProhibitionViolated { .. }
            | FailureCode::UnknownPredicate { .. } => FailureCategory::Constraint,
            FailureCode::CanonicalFactProtected { .. }
            | FailureCode::CanonicalContradiction { .. } => FailureCategory::Canonical,
            FailureCode::AuthorityExceeded { .. } => FailureCategory::Authority,
            FailureCode::UnknownIntentType { .. } => FailureCategory::Intent,
        }
    }
}

/// What a failure is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRef {
    /// The output as a whole (constraint layer).
    Output,
    /// Index into `proposed_mutations`.
    Mutation(usize),
    /// Index into `world_intents`.
    Intent(usize),
}

/// One recorded failure.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationFailure {
    pub code: FailureCode,
    pub severity: Severity,
    pub item: ItemRef,
    pub message: String,
    /// The violated constraint, for retry escalation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
}

/// The gate's verdict. `passed == false` routes to the retry policy;
/// `passed == true` routes the approved lists to the mutation controller;
/// possibly with item-level rejections recorded (a degraded pass).
#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub approved_mutations: Vec<ProposedMutation>,
    pub approved_intents: Vec<WorldIntent>,
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn clean_pass(
        approved_mutations: Vec<ProposedMutation>,
        approved_intents: Vec<WorldIntent>,
    ) -> Self {
        Self {
            passed: true,
            approved_mutations,
            approved_intents,
            failures: Vec::new(),
        }
    }

    pub fn failure_categories(&self) -> BTreeSet<FailureCategory> {
        self.failures.iter().map(|f| f.code.category()).collect()
    }

    pub fn has_category(&self, category: FailureCategory) -> bool {
        self.failures.iter().any(|f| f.code.category() == category)
    }

    /// Constraint failures at Hard or Critical severity: the ones that fail
    /// the report and feed retry escalation.
    pub fn blocking_constraint_failures(&self) -> Vec<&ValidationFailure> {
        self.failures
            .iter()
            .filter(|f| {
                f.code.category() == FailureCategory::Constraint && f.severity >= Severity::Hard
            })
            .collect()
    }

    pub fn has_critical(&self) -> bool {
        self.failures.iter().any(|f| f.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_by_layer() {
        assert_eq!(
            FailureCode::CanonicalFactProtected {
                subject: "x".into()
            }
            .category(),
            FailureCategory::Canonical
        );
        assert_eq!(
            FailureCode::UnknownIntentType {
                intent_type: "warp".into()
            }
            .category(),
            FailureCategory::Intent
        );
        assert_eq!(
            FailureCode::RequirementUnmet {
                predicate: PredicateId::new("p")
            }
            .category(),
            FailureCategory::Constraint
        );
    }
}
